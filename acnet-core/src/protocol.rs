//! acnet wire protocol: message kinds and payload types.

/// Wire tag for each message kind (first byte of every frame).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Application-defined binary payload.
    Opaque = 1,
    /// Client -> server join/identify.
    RegistrationInfo = 2,
    /// Server -> client directive.
    ClientActionRequired = 3,
}

impl MessageKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::Opaque),
            2 => Some(MessageKind::RegistrationInfo),
            3 => Some(MessageKind::ClientActionRequired),
            _ => None,
        }
    }
}

/// Generates a `u32`-backed wire enum with checked conversion from the raw value.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
        #[repr(u32)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),+
        }

        impl $name {
            pub fn as_u32(self) -> u32 {
                self as u32
            }
        }

        impl TryFrom<u32> for $name {
            type Error = ProtocolError;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    _ => Err(ProtocolError::InvalidEnum {
                        field: stringify!($name),
                        value,
                    }),
                }
            }
        }
    };
}

wire_enum! {
    /// Platform the game client runs on.
    Platform {
        Unknown = 0,
        Windows = 1,
        Mac = 2,
        Linux = 3,
        Xbox = 4,
        PlayStation = 5,
        Nintendo = 6,
        IOS = 7,
        Android = 8,
    }
}

wire_enum! {
    /// What the client must do in response to a server directive.
    ClientAction {
        Invalid = 0,
        /// The player must be removed from the session.
        RemovePlayer = 1,
    }
}

wire_enum! {
    /// Why the server issued a [`ClientAction`].
    ActionReason {
        Invalid = 0,
        InternalError = 1,
        InvalidMessage = 2,
        AuthenticationFailed = 3,
        NullClient = 4,
        HeartbeatTimeout = 5,
        ClientViolation = 6,
        BackendViolation = 7,
        TemporaryCooldown = 8,
        TemporaryBanned = 9,
        PermanentBanned = 10,
    }
}

impl std::str::FromStr for Platform {
    type Err = ProtocolError;

    /// Case-insensitive platform name, as written in config files.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let p = match s.to_ascii_lowercase().as_str() {
            "unknown" => Platform::Unknown,
            "windows" => Platform::Windows,
            "mac" | "macos" => Platform::Mac,
            "linux" => Platform::Linux,
            "xbox" => Platform::Xbox,
            "playstation" => Platform::PlayStation,
            "nintendo" => Platform::Nintendo,
            "ios" => Platform::IOS,
            "android" => Platform::Android,
            _ => return Err(ProtocolError::UnknownPlatform(s.to_string())),
        };
        Ok(p)
    }
}

/// Client join/identify message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RegistrationInfo {
    pub product_user_id: String,
    /// Connect ID token (JWT) proving the product user id.
    pub connect_id_token: String,
    pub platform: Platform,
}

/// Server directive telling a client to act (e.g. leave the session).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ClientActionRequired {
    pub action: ClientAction,
    pub reason: ActionReason,
    /// Human-readable reason.
    pub details: String,
}

/// All wire message types. Framing is tag + u32 length prefix (see wire module).
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Message {
    Opaque(Vec<u8>),
    RegistrationInfo(RegistrationInfo),
    ClientActionRequired(ClientActionRequired),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Opaque(_) => MessageKind::Opaque,
            Message::RegistrationInfo(_) => MessageKind::RegistrationInfo,
            Message::ClientActionRequired(_) => MessageKind::ClientActionRequired,
        }
    }
}

impl From<RegistrationInfo> for Message {
    fn from(info: RegistrationInfo) -> Self {
        Message::RegistrationInfo(info)
    }
}

impl From<ClientActionRequired> for Message {
    fn from(info: ClientActionRequired) -> Self {
        Message::ClientActionRequired(info)
    }
}

/// Error in a message payload's field layout or values.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid {field} value {value}")]
    InvalidEnum { field: &'static str, value: u32 },
    #[error("unknown platform {0:?}")]
    UnknownPlatform(String),
    #[error("string field is missing its NUL terminator")]
    MissingNul,
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("payload truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}
