//! Identities for tables, columns and joins.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(TableId);
string_id!(ColumnId);
string_id!(JoinId);

fn random_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl TableId {
    pub fn generate() -> Self {
        Self(random_id())
    }
}

impl ColumnId {
    pub fn generate() -> Self {
        Self(random_id())
    }
}

impl JoinId {
    /// Id of the relationship declared from `source` to `target`.
    pub fn between(source: &TableId, target: &TableId) -> Self {
        Self(format!("{}->{}", source, target))
    }

    /// Id of the n-th additional relationship over the same ordered pair.
    /// `nth(a, b, 0)` is `between(a, b)`.
    pub fn nth(source: &TableId, target: &TableId, n: usize) -> Self {
        if n == 0 {
            Self::between(source, target)
        } else {
            Self(format!("{}->{}#{}", source, target, n))
        }
    }

    /// Endpoint table ids encoded in the id, if it was derived by [`JoinId::between`].
    pub fn endpoints(&self) -> Option<(TableId, TableId)> {
        let (source, rest) = self.0.split_once("->")?;
        let target = rest.split('#').next().unwrap_or(rest);
        Some((TableId::from(source), TableId::from(target)))
    }
}
