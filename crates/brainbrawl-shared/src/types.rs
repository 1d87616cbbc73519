use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Store-assigned identifier of a row in the `players` collection.
    PlayerId
);
entity_id!(
    /// Store-assigned identifier of a row in the `questions` collection.
    QuestionId
);
entity_id!(
    /// Store-assigned identifier of a row in the `games` collection.
    GameId
);

/// Which side of the table a sync message comes from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Master,
    Player,
}

impl Role {
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Role::Master)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Master => f.write_str("master"),
            Role::Player => f.write_str("player"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&PlayerId(7)).unwrap();
        assert_eq!(json, "7");
        let back: QuestionId = serde_json::from_str("42").unwrap();
        assert_eq!(back, QuestionId(42));
    }

    #[test]
    fn role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Master).unwrap(), "\"master\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"player\"").unwrap(),
            Role::Player
        );
        assert!(Role::Master.is_authoritative());
        assert!(!Role::Player.is_authoritative());
    }
}
