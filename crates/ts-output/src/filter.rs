//! Which event types a run persists.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use ts_core::LogEvent;

use crate::{OutputError, OutputResult};

/// `"all"`, or an explicit list of `_type` names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFilter {
    #[default]
    All,
    Types(FxHashSet<String>),
}

impl LogFilter {
    /// A filter accepting exactly `types`.  Unknown names are rejected.
    pub fn types<I, S>(types: I) -> OutputResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = FxHashSet::default();
        for t in types {
            let t = t.into();
            if !LogEvent::ALL_TYPES.contains(&t.as_str()) {
                return Err(OutputError::UnknownLogType(t));
            }
            set.insert(t);
        }
        Ok(LogFilter::Types(set))
    }

    #[inline]
    pub fn accepts(&self, type_name: &str) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Types(set) => set.contains(type_name),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Repr {
    Keyword(String),
    List(Vec<String>),
}

impl Serialize for LogFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LogFilter::All => Repr::Keyword("all".into()).serialize(serializer),
            LogFilter::Types(set) => {
                let mut list: Vec<String> = set.iter().cloned().collect();
                list.sort();
                Repr::List(list).serialize(serializer)
            }
        }
    }
}

impl<'de> Deserialize<'de> for LogFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Keyword(k) if k == "all" => Ok(LogFilter::All),
            Repr::Keyword(k) => Err(serde::de::Error::custom(format!("expected \"all\" or a list, got {k:?}"))),
            Repr::List(list) => LogFilter::types(list).map_err(serde::de::Error::custom),
        }
    }
}
