//! Local-first tracking of Work items and their supporting Artifacts.
//!
//! Every entity is a document with a YAML header under a storage root; the
//! directory an entity lives in encodes its schedule (Work) or type
//! (Artifact). Graph, decay and group views are recomputed from the documents
//! on demand.

/// Declares a closed set of lowercase labels backed by a `Copy` enum.
///
/// Every generated type gets `ALL`, `as_str`, `Display`, `FromStr` (trimmed,
/// case-insensitive, `-` accepted for `_`) and string-based serde impls.
macro_rules! labeled_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident as $kind:literal {
            $($variant:ident => $label:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::domain::ParseLabelError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
                match normalized.as_str() {
                    $($label $(| $alias)* => Ok($name::$variant),)+
                    _ => Err($crate::domain::ParseLabelError::new(
                        $kind,
                        value,
                        &[$($label),+],
                    )),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse::<$name>().map_err(serde::de::Error::custom)
            }
        }
    };
}

pub mod app;
pub mod config;
pub mod document;
pub mod domain;
pub mod entity_id;
pub mod git;
pub mod graph;
pub mod groups;
pub mod hooks;
pub mod journal;
pub mod lifecycle;
pub mod roots;
pub mod store;

pub use app::{App, AppError};
pub use config::{DispatchMode, EngineConfig, GroupConfig, HookConfig, LifecycleConfig};
pub use domain::artifact::{Artifact, ArtifactStatus, ArtifactType};
pub use domain::group::{Group, GroupStatus};
pub use domain::schedule::{Priority, Schedule, WorkStatus};
pub use domain::update::{Update, UpdateKind};
pub use domain::work::Work;
pub use domain::EntityKind;
pub use store::{EntityStore, StoreError};
