//! Packet model carried by a face: Interest out, Data or Nack in.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::name::Name;
use crate::tlv::{self, NniError};

/// Named pull request. Elicits at most one Data or Nack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    pub name: Name,
    pub nonce: u32,
    pub lifetime: Duration,
    pub must_be_fresh: bool,
}

impl Interest {
    pub fn new(name: Name, lifetime: Duration) -> Self {
        Self {
            name,
            nonce: rand::random(),
            lifetime,
            must_be_fresh: false,
        }
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Draw a new random nonce; every (re)transmission carries a fresh one.
    pub fn renew_nonce(&mut self) {
        self.nonce = rand::random();
    }
}

/// Data ContentType. `Nack` marks an application-level failure whose
/// content is an NNI error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Blob,
    Nack,
    Other(u32),
}

impl ContentType {
    pub fn from_tlv(value: u32) -> Self {
        match value {
            0 => ContentType::Blob,
            3 => ContentType::Nack,
            v => ContentType::Other(v),
        }
    }

    pub fn to_tlv(self) -> u32 {
        match self {
            ContentType::Blob => 0,
            ContentType::Nack => 3,
            ContentType::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Data {
    pub name: Name,
    pub content_type: ContentType,
    pub content: Vec<u8>,
}

impl Data {
    pub fn new(name: Name, content: Vec<u8>) -> Self {
        Self {
            name,
            content_type: ContentType::Blob,
            content,
        }
    }

    /// Application-level failure carrying `code`.
    pub fn app_nack(name: Name, code: u64) -> Self {
        Self {
            name,
            content_type: ContentType::Nack,
            content: tlv::encode_nni(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NackReason {
    Congestion,
    Duplicate,
    NoRoute,
    Unspecified,
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NackReason::Congestion => "Congestion",
            NackReason::Duplicate => "Duplicate",
            NackReason::NoRoute => "NoRoute",
            NackReason::Unspecified => "Unspecified",
        };
        f.write_str(s)
    }
}

/// Network-level negative response to an Interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nack {
    pub interest: Interest,
    pub reason: NackReason,
}

impl Nack {
    pub fn new(interest: Interest, reason: NackReason) -> Self {
        Self { interest, reason }
    }

    pub fn name(&self) -> &Name {
        &self.interest.name
    }
}

/// Wire unit exchanged with a face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Data(Data),
    Nack(Nack),
}

/// Inbound packet after classification at the face boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Data(Data),
    Nack {
        name: Name,
        reason: NackReason,
    },
    ApplicationError {
        name: Name,
        code: Result<u64, NniError>,
    },
}

impl Inbound {
    pub fn name(&self) -> &Name {
        match self {
            Inbound::Data(d) => &d.name,
            Inbound::Nack { name, .. } | Inbound::ApplicationError { name, .. } => name,
        }
    }
}

impl Packet {
    /// Decode once what a consumer should do with this packet.
    /// An Interest arriving at a consumer is not something it can answer.
    pub fn classify(self) -> Result<Inbound, FetchError> {
        match self {
            Packet::Data(data) if data.content_type == ContentType::Nack => {
                Ok(Inbound::ApplicationError {
                    code: tlv::decode_nni(&data.content),
                    name: data.name,
                })
            }
            Packet::Data(data) => Ok(Inbound::Data(data)),
            Packet::Nack(nack) => Ok(Inbound::Nack {
                reason: nack.reason,
                name: nack.interest.name,
            }),
            Packet::Interest(interest) => Err(FetchError::UnsupportedPacket(format!(
                "interest {}",
                interest.name
            ))),
        }
    }
}
