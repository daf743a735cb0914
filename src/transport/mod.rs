//! The link to the device: command framing and the [`Transport`] contract.

use std::time::Duration;

#[cfg(feature = "usb")]
mod usb;

#[cfg(feature = "usb")]
pub use usb::{UsbTransport, UsbTransportError};

/// Length of every outbound command frame, in bytes.
pub const FRAME_LEN: usize = 8;

/// Length of every inbound response, in bytes.
///
/// The count is a negotiated constant of the protocol; responses carry no
/// length field.
pub const RESPONSE_LEN: usize = 8;

/// Sentinel byte that fills a frame after the opcode and parameters.
pub const PADDING_BYTE: u8 = 0xF4;

/// Identity and transfer parameters of the monitor.
///
/// Passed by value into the transport constructor; there is no process-wide
/// protocol state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub vendor_id: u16,
    pub product_id: u16,
    /// Interrupt-IN endpoint responses are read from.
    pub read_endpoint: u8,
    /// Timeout applied to each control transfer and interrupt read.
    pub timeout: Duration,
    /// Treat a failed kernel-driver detach as a hard error instead of a
    /// warning. Off by default; real hardware has been observed to work
    /// either way as long as selecting the configuration still succeeds.
    pub abort_on_detach_failure: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: 0x0c45,
            product_id: 0x7406,
            read_endpoint: 0x81,
            timeout: Duration::from_millis(1000),
            abort_on_detach_failure: false,
        }
    }
}

/// One outbound protocol unit: an opcode and its parameter bytes.
///
/// Parameters never fill the frame; `params.len() < FRAME_LEN` is an
/// invariant of the protocol's opcode table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    opcode: u8,
    params: Vec<u8>,
}

impl Command {
    pub fn new(opcode: u8) -> Self {
        Self {
            opcode,
            params: Vec::new(),
        }
    }

    pub fn with_param(opcode: u8, param: u8) -> Self {
        Self {
            opcode,
            params: vec![param],
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Serialize to the fixed-size frame: opcode, then parameters, then
    /// [`PADDING_BYTE`] up to [`FRAME_LEN`]. The transmitted length is the
    /// same for every opcode.
    pub fn to_frame(&self) -> [u8; FRAME_LEN] {
        debug_assert!(self.params.len() < FRAME_LEN);

        let params = &self.params[..self.params.len().min(FRAME_LEN - 1)];

        let mut frame = [PADDING_BYTE; FRAME_LEN];
        frame[0] = self.opcode;
        frame[1..1 + params.len()].copy_from_slice(params);
        frame
    }
}

/// Exactly [`RESPONSE_LEN`] bytes read back from the device after a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response([u8; RESPONSE_LEN]);

impl Response {
    pub fn bytes(&self) -> &[u8; RESPONSE_LEN] {
        &self.0
    }
}

impl From<[u8; RESPONSE_LEN]> for Response {
    fn from(value: [u8; RESPONSE_LEN]) -> Self {
        Self(value)
    }
}

/// A bidirectional link to the monitor.
///
/// The protocol is strictly sequential: every command is followed by at most
/// one response read, and a transport is exclusively owned by one session for
/// its entire lifetime.
pub trait Transport {
    type SendError: core::fmt::Debug;
    type RecvError: core::fmt::Debug;
    type Error: core::fmt::Debug + From<Self::SendError> + From<Self::RecvError>;

    /// Transmit a single command frame. Issued exactly once per call; there
    /// is no retry below the session layer.
    fn send(&mut self, command: &Command) -> Result<(), Self::SendError>;

    /// Blocking read of one full response.
    fn recv(&mut self) -> Result<Response, Self::RecvError>;

    fn send_recv(&mut self, command: &Command) -> Result<Response, Self::Error> {
        self.send(command)?;
        Ok(self.recv()?)
    }

    /// Reset the device and release the handle. Idempotent; safe to call
    /// after a prior failure.
    fn close(&mut self);
}

/// A typed protocol command: its wire encoding plus the decoding of its
/// response.
///
/// Decoding is total. The device performs no validation of response bytes,
/// so neither does any implementor; out-of-range values pass through.
pub trait Bm58Command: Into<Command> {
    type Output;

    fn parse_response(response: &Response) -> Self::Output;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_constant_length() {
        let plain = Command::new(0xA2).to_frame();
        assert_eq!(plain, [0xA2, 0xF4, 0xF4, 0xF4, 0xF4, 0xF4, 0xF4, 0xF4]);

        let with_param = Command::with_param(0xA3, 0x05).to_frame();
        assert_eq!(with_param, [0xA3, 0x05, 0xF4, 0xF4, 0xF4, 0xF4, 0xF4, 0xF4]);

        assert_eq!(plain.len(), with_param.len());
    }

    #[test]
    fn response_exposes_raw_bytes() {
        let response = Response::from([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(response.bytes(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
