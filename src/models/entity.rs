use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

use super::EntityKind;

/// A payload type that can be stored locally and synchronized.
pub trait Entity: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection this payload belongs to.
    const KIND: EntityKind;

    /// Content key built from the semantically significant fields.
    ///
    /// Must ignore identifiers, timestamps and sync metadata, and must not
    /// depend on the order of unordered sub-collections.
    fn fingerprint(&self) -> String;
}
