use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

pub const MAX_PARAM_LEN: usize = 256;
pub const PACKET_HEADER_LEN: usize = 4;
pub const MAX_PACKET_SIZE: usize = PACKET_HEADER_LEN + MAX_PARAM_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u16);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Who produced a command packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandSource {
    /// Uplinked from the ground segment.
    Ground,
    /// Synthesized by the scheduler from a command block.
    Internal,
}

/// Identifier plus parameter payload. Immutable once built; the parameter
/// length is checked against `MAX_PARAM_LEN` on every construction path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCommandPacket")]
pub struct CommandPacket {
    id: CommandId,
    #[serde(with = "serde_bytes")]
    params: alloc::vec::Vec<u8>,
}

#[derive(Deserialize)]
struct RawCommandPacket {
    id: CommandId,
    #[serde(default, with = "serde_bytes")]
    params: alloc::vec::Vec<u8>,
}

impl TryFrom<RawCommandPacket> for CommandPacket {
    type Error = ProtocolError;

    fn try_from(raw: RawCommandPacket) -> Result<Self, Self::Error> {
        Self::new(raw.id, &raw.params)
    }
}

impl CommandPacket {
    pub fn new(id: CommandId, params: &[u8]) -> Result<Self, ProtocolError> {
        if params.len() > MAX_PARAM_LEN {
            return Err(ProtocolError::ParamsTooLong(params.len()));
        }
        Ok(Self {
            id,
            params: params.to_vec(),
        })
    }

    /// Packet without parameters.
    pub fn bare(id: CommandId) -> Self {
        Self {
            id,
            params: alloc::vec::Vec::new(),
        }
    }

    /// Decode the already-framed wire shape `id:u16 BE | len:u16 BE | params`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < PACKET_HEADER_LEN {
            return Err(ProtocolError::Truncated);
        }
        let id = u16::from_be_bytes([bytes[0], bytes[1]]);
        let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        let body = &bytes[PACKET_HEADER_LEN..];

        if declared > MAX_PARAM_LEN {
            return Err(ProtocolError::ParamsTooLong(declared));
        }
        if declared != body.len() {
            return Err(ProtocolError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }

        Self::new(CommandId(id), body)
    }

    pub fn to_bytes(&self) -> heapless::Vec<u8, MAX_PACKET_SIZE> {
        let mut out = heapless::Vec::new();
        // Length was bounded at construction, so every push fits.
        let _ = out.extend_from_slice(&self.id.0.to_be_bytes());
        let _ = out.extend_from_slice(&(self.params.len() as u16).to_be_bytes());
        let _ = out.extend_from_slice(&self.params);
        out
    }

    pub fn from_json(json_str: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json_str).map_err(|_| ProtocolError::InvalidJson)
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn param_len(&self) -> usize {
        self.params.len()
    }

    /// Parameters as a fixed-size array; any other length is `IllegalLength`.
    pub fn params_exact<const N: usize>(&self) -> Result<[u8; N], ExecStatus> {
        self.params
            .as_slice()
            .try_into()
            .map_err(|_| ExecStatus::IllegalLength)
    }

    pub fn param_u8(&self, offset: usize) -> Option<u8> {
        self.params.get(offset).copied()
    }

    pub fn param_u32(&self, offset: usize) -> Option<u32> {
        let end = offset.checked_add(4)?;
        let bytes: [u8; 4] = self.params.get(offset..end)?.try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }
}

/// Framework-level execution status. Domain-level outcomes travel in
/// `CommandResult::err_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecStatus {
    Success,
    IllegalContext,
    IllegalParameter,
    IllegalLength,
    UnknownCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exec: ExecStatus,
    pub err_code: i32,
}

impl CommandResult {
    pub const fn success() -> Self {
        Self {
            exec: ExecStatus::Success,
            err_code: 0,
        }
    }

    /// Handler ran; the collaborator reported `err_code` (0 = OK).
    pub const fn with_code(err_code: i32) -> Self {
        Self {
            exec: ExecStatus::Success,
            err_code,
        }
    }

    pub const fn rejected(exec: ExecStatus) -> Self {
        Self { exec, err_code: 0 }
    }

    pub fn is_success(&self) -> bool {
        self.exec == ExecStatus::Success
    }

    /// Executed and the collaborator reported no error either.
    pub fn is_clean(&self) -> bool {
        self.is_success() && self.err_code == 0
    }
}

impl From<ExecStatus> for CommandResult {
    fn from(exec: ExecStatus) -> Self {
        Self::rejected(exec)
    }
}

/// Acknowledgement returned to the command originator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandAck {
    pub id: CommandId,
    pub sequence: u32,
    pub source: CommandSource,
    pub tick: u32,
    pub result: CommandResult,
    pub message: Option<alloc::string::String>,
}

impl CommandAck {
    pub fn to_json(&self) -> Result<alloc::string::String, ProtocolError> {
        serde_json::to_string(self).map_err(|_| ProtocolError::InvalidJson)
    }
}
