//! String-backed id newtypes for the domain entities. Ids are opaque UUIDs
//! minted by the stores; the newtypes exist so a capsule id cannot be handed
//! to an API expecting a memory id.

use serde::{Deserialize, Serialize};
use sqlx::{Database, Decode, Encode, Type};
use std::{fmt, str::FromStr};

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self::from(s))
            }
        }

        // Reads and binds as plain TEXT so the repositories can pass ids
        // straight into queries.
        impl<DB> Type<DB> for $name
        where
            DB: Database,
            String: Type<DB>,
        {
            fn type_info() -> DB::TypeInfo {
                <String as Type<DB>>::type_info()
            }

            fn compatible(ty: &DB::TypeInfo) -> bool {
                <String as Type<DB>>::compatible(ty)
            }
        }

        impl<'q, DB> Encode<'q, DB> for $name
        where
            DB: Database,
            String: Encode<'q, DB>,
        {
            fn encode_by_ref(
                &self,
                buf: &mut <DB as Database>::ArgumentBuffer<'q>,
            ) -> std::result::Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                self.0.encode_by_ref(buf)
            }
        }

        impl<'r, DB> Decode<'r, DB> for $name
        where
            DB: Database,
            String: Decode<'r, DB>,
        {
            fn decode(
                value: <DB as Database>::ValueRef<'r>,
            ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
                Ok(Self(<String as Decode<DB>>::decode(value)?))
            }
        }
    };
}

id_newtype!(
    /// Identifies a capsule and names its broadcast room.
    CapsuleId
);
id_newtype!(MemoryId);
id_newtype!(UserId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = CapsuleId::from("cap-1");
        assert_eq!(serde_json::to_value(&id).unwrap(), "cap-1");
        assert_eq!(id.to_string(), "cap-1");
    }

    #[test]
    fn ids_parse_infallibly() {
        let id: MemoryId = "mem-1".parse().expect("infallible");
        assert_eq!(id.as_str(), "mem-1");
        assert_eq!(String::from(id), "mem-1");
    }
}
