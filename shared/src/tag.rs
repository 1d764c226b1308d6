//! Registered TLV tag table

use crate::error::CodecError;
use std::fmt;
use std::str::FromStr;

/// Width of every tag code on the wire
pub const TAG_LEN: usize = 4;

/// Every tag the protocol knows about. Ordering follows the numeric code so a
/// `Message` always serializes its records in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Nickname,
    Room,
    Info,
    Ok,
    Fail,
    RollDiceResult,
    GetRooms,
    GetUserInfo,
    Start,
    Started,
    Finished,
    NewTurn,
    RollDice,
    MoveOrPlace,
    PlaceFigure,
    MoveFigure,
    OptionPut,
    OptionMove,
    OptionSkip,
}

impl Tag {
    pub const ALL: [Tag; 19] = [
        Tag::Nickname,
        Tag::Room,
        Tag::Info,
        Tag::Ok,
        Tag::Fail,
        Tag::RollDiceResult,
        Tag::GetRooms,
        Tag::GetUserInfo,
        Tag::Start,
        Tag::Started,
        Tag::Finished,
        Tag::NewTurn,
        Tag::RollDice,
        Tag::MoveOrPlace,
        Tag::PlaceFigure,
        Tag::MoveFigure,
        Tag::OptionPut,
        Tag::OptionMove,
        Tag::OptionSkip,
    ];

    /// Four character wire code
    pub fn code(self) -> &'static str {
        match self {
            Tag::Nickname => "0001",
            Tag::Room => "0002",
            Tag::Info => "0100",
            Tag::Ok => "1111",
            Tag::Fail => "1112",
            Tag::RollDiceResult => "1113",
            Tag::GetRooms => "3000",
            Tag::GetUserInfo => "3001",
            Tag::Start => "5000",
            Tag::Started => "5001",
            Tag::Finished => "5002",
            Tag::NewTurn => "5003",
            Tag::RollDice => "5010",
            Tag::MoveOrPlace => "5012",
            Tag::PlaceFigure => "5013",
            Tag::MoveFigure => "5014",
            Tag::OptionPut => "6000",
            Tag::OptionMove => "6001",
            Tag::OptionSkip => "6002",
        }
    }

    /// Acknowledgement tags answer a correlated request
    pub fn is_ack(self) -> bool {
        matches!(self, Tag::Ok | Tag::Fail)
    }
}

impl FromStr for Tag {
    type Err = CodecError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        Tag::ALL
            .iter()
            .copied()
            .find(|tag| tag.code() == code)
            .ok_or_else(|| CodecError::UnknownTag(code.to_string()))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique_and_fixed_width() {
        let mut seen = HashSet::new();
        for tag in Tag::ALL {
            assert_eq!(tag.code().len(), TAG_LEN);
            assert!(seen.insert(tag.code()), "duplicate code {}", tag.code());
        }
    }

    #[test]
    fn test_parse_known_code() {
        assert_eq!("5003".parse::<Tag>().unwrap(), Tag::NewTurn);
        assert_eq!("0001".parse::<Tag>().unwrap(), Tag::Nickname);
    }

    #[test]
    fn test_parse_unknown_code() {
        match "9999".parse::<Tag>() {
            Err(CodecError::UnknownTag(code)) => assert_eq!(code, "9999"),
            other => panic!("expected unknown tag, got {:?}", other),
        }
    }

    #[test]
    fn test_ordering_follows_codes() {
        let mut sorted = Tag::ALL;
        sorted.sort_by_key(|tag| tag.code());
        assert_eq!(sorted, Tag::ALL);
    }
}
