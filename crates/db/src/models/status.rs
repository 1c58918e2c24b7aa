//! Status and kind enums mapping to SMALLINT columns.
//!
//! Each variant's discriminant is the value stored in the database
//! (1-based, declaration order). `name()` is the lower-snake string the
//! API exposes; `parse()` is its inverse and rejects unknown names.

use stillpoint_core::error::CoreError;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $str:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Database column value.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Lower-snake name as exposed by the API.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $str ),+
                }
            }

            /// Resolve a database column value back to the enum.
            pub fn from_id(id: StatusId) -> Result<Self, CoreError> {
                $(
                    if id == $name::$variant as StatusId {
                        return Ok(Self::$variant);
                    }
                )+
                Err(CoreError::Internal(format!(
                    "Unknown {} id {id}", stringify!($name)
                )))
            }

            /// Parse a lower-snake name. Unknown names are rejected.
            pub fn parse(name: &str) -> Result<Self, CoreError> {
                $(
                    if name == $str {
                        return Ok(Self::$variant);
                    }
                )+
                Err(CoreError::Validation(format!(
                    "Unknown {} '{name}'", stringify!($name)
                )))
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle of a generation request through the pipeline.
    RequestStatus {
        Pending = 1 => "pending",
        GeneratingScript = 2 => "generating_script",
        GeneratingVoice = 3 => "generating_voice",
        GeneratingVideo = 4 => "generating_video",
        Compositing = 5 => "compositing",
        Completed = 6 => "completed",
        Failed = 7 => "failed",
    }
}

impl RequestStatus {
    /// Whether the request can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

define_status_enum! {
    /// Script sourcing, mirroring `stillpoint_core::request::ScriptType`.
    ScriptTypeId {
        AiGenerated = 1 => "ai_generated",
        UserProvided = 2 => "user_provided",
        Template = 3 => "template",
    }
}

define_status_enum! {
    /// Visibility of a request or video. `PendingReview` applies only to
    /// freshly published videos awaiting moderation.
    VisibilityId {
        Public = 1 => "public",
        Private = 2 => "private",
        PendingReview = 3 => "pending_review",
    }
}

define_status_enum! {
    /// Moderation verdict on a published video.
    ModerationStatus {
        Pending = 1 => "pending",
        Approved = 2 => "approved",
        Rejected = 3 => "rejected",
    }
}

define_status_enum! {
    /// Ledger transaction type.
    TxType {
        Purchase = 1 => "purchase",
        GenerationSpend = 2 => "generation_spend",
        PrivateSurcharge = 3 => "private_surcharge",
        Refund = 4 => "refund",
    }
}

define_status_enum! {
    /// Queue job delivery state.
    JobStatus {
        Queued = 1 => "queued",
        Running = 2 => "running",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Media catalog asset kind.
    MediaAssetKind {
        AmbientSound = 1 => "ambient_sound",
        MusicTrack = 2 => "music_track",
    }
}

// Bridges to the core request enums (the serde boundary lives in core;
// the database stores the ids defined here).

impl From<stillpoint_core::request::ScriptType> for ScriptTypeId {
    fn from(value: stillpoint_core::request::ScriptType) -> Self {
        match value {
            stillpoint_core::request::ScriptType::AiGenerated => Self::AiGenerated,
            stillpoint_core::request::ScriptType::UserProvided => Self::UserProvided,
            stillpoint_core::request::ScriptType::Template => Self::Template,
        }
    }
}

impl From<stillpoint_core::request::Visibility> for VisibilityId {
    fn from(value: stillpoint_core::request::Visibility) -> Self {
        match value {
            stillpoint_core::request::Visibility::Public => Self::Public,
            stillpoint_core::request::Visibility::Private => Self::Private,
        }
    }
}
