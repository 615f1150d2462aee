use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(DoseKind {
    Medication => "medication",
    Supplement => "supplement",
});

// Persisted outcome of a slot. There is deliberately no Missed variant:
// a missed slot has no row and is inferred at query time (see SlotState).
str_enum!(EntryStatus {
    Taken => "taken",
    Skipped => "skipped",
});

// Display-time state of one slot on one date.
str_enum!(SlotState {
    Taken => "taken",
    Skipped => "skipped",
    Missed => "missed",
    Upcoming => "upcoming",
});

// Calendar cell classification. NoData is distinct from AllMissed:
// a day with nothing scheduled and nothing logged renders empty, not red.
str_enum!(DayStatus {
    NoData => "no_data",
    Complete => "complete",
    Partial => "partial",
    AllMissed => "all_missed",
});
