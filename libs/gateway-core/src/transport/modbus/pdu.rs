//! Modbus PDU on a fixed stack buffer
//!
//! Only the requests a register gateway sends are built here: FC03, FC06
//! and FC16. Replies are parsed in place.

use errors::{GatewayError, GatewayResult};
use tracing::trace;

use super::constants::{
    EXCEPTION_FLAG, FC_READ_HOLDING_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS,
    FC_WRITE_SINGLE_REGISTER, MAX_PDU_SIZE, MODBUS_MAX_READ_REGISTERS,
    MODBUS_MAX_WRITE_REGISTERS,
};

#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    fn empty() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    fn with_header(function: u8, address: u16, word: u16) -> Self {
        let mut pdu = Self::empty();
        let [a_hi, a_lo] = address.to_be_bytes();
        let [w_hi, w_lo] = word.to_be_bytes();
        pdu.data[..5].copy_from_slice(&[function, a_hi, a_lo, w_hi, w_lo]);
        pdu.len = 5;
        pdu
    }

    /// FC03 for `count` holding registers at `address`
    pub fn read_holding(address: u16, count: u16) -> GatewayResult<Self> {
        if count == 0 || usize::from(count) > MODBUS_MAX_READ_REGISTERS {
            return Err(GatewayError::out_of_range(count, 1, MODBUS_MAX_READ_REGISTERS));
        }
        Ok(Self::with_header(FC_READ_HOLDING_REGISTERS, address, count))
    }

    /// FC06 for one word, FC16 for more
    pub fn write(address: u16, values: &[u16]) -> GatewayResult<Self> {
        match values {
            [] => Err(GatewayError::encoding("no registers to write")),
            [value] => Ok(Self::with_header(FC_WRITE_SINGLE_REGISTER, address, *value)),
            _ if values.len() > MODBUS_MAX_WRITE_REGISTERS => Err(GatewayError::out_of_range(
                values.len(),
                1,
                MODBUS_MAX_WRITE_REGISTERS,
            )),
            _ => {
                let mut pdu =
                    Self::with_header(FC_WRITE_MULTIPLE_REGISTERS, address, values.len() as u16);
                pdu.data[5] = (values.len() * 2) as u8;
                for (i, value) in values.iter().enumerate() {
                    pdu.data[6 + 2 * i..8 + 2 * i].copy_from_slice(&value.to_be_bytes());
                }
                pdu.len = 6 + values.len() * 2;
                Ok(pdu)
            },
        }
    }

    /// Wrap a received PDU
    pub fn from_slice(bytes: &[u8]) -> GatewayResult<Self> {
        if bytes.len() > MAX_PDU_SIZE {
            return Err(GatewayError::decoding(format!(
                "PDU of {} bytes exceeds {}",
                bytes.len(),
                MAX_PDU_SIZE
            )));
        }
        let mut pdu = Self::empty();
        pdu.data[..bytes.len()].copy_from_slice(bytes);
        pdu.len = bytes.len();
        trace!("PDU in: {:02X?}", pdu.as_slice());
        Ok(pdu)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn function_code(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// Exception code of an error reply
    pub fn exception_code(&self) -> Option<u8> {
        match self.as_slice() {
            [function, code, ..] if function & EXCEPTION_FLAG != 0 => Some(*code),
            _ => None,
        }
    }

    /// Big-endian word at a byte position
    pub fn u16_at(&self, pos: usize) -> Option<u16> {
        let bytes = self.as_slice().get(pos..pos + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Register words of an FC03 reply, checked against the requested count
    pub fn read_reply_words(&self, count: u16) -> GatewayResult<Vec<u16>> {
        let expected = usize::from(count) * 2;
        match self.as_slice() {
            [_, byte_count, words @ ..]
                if usize::from(*byte_count) == expected && words.len() == expected =>
            {
                Ok(words
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect())
            },
            other => Err(GatewayError::decoding(format!(
                "FC03 reply for {} registers has {} PDU bytes",
                count,
                other.len()
            ))),
        }
    }
}
