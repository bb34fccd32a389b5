//! Drive process data codec.
//!
//! Fixed PDO layout of the servo drives (SOMANET-style mapping, CiA-402
//! objects plus vendor tuning and I/O). All fields are little-endian and
//! packed without padding. Decoding and encoding go field by field through
//! [`ImageReader`] / [`ImageWriter`]; the image bytes are never reinterpreted
//! as structs.

use static_assertions::const_assert_eq;
use std::mem::size_of;
use thiserror::Error;

/// Image slice shorter than the drive layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{direction} slice holds {len} bytes, drive layout needs {required}")]
pub struct PdoError {
    /// "input" or "output"
    pub direction: &'static str,
    /// Bytes available
    pub len: usize,
    /// Bytes required
    pub required: usize,
}

/// Drive → master process data (TxPDO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveInputs {
    /// CiA-402 status word (0x6041)
    pub status_word: u16,
    /// Modes of operation display (0x6061)
    pub op_mode_display: i8,
    /// Position actual value [inc] (0x6064)
    pub position_value: i32,
    /// Velocity actual value (0x606C)
    pub velocity_value: i32,
    /// Torque actual value [‰ rated] (0x6077)
    pub torque_value: i16,
    /// Analog inputs 1-4
    pub analog_inputs: [u16; 4],
    /// Tuning status
    pub tuning_status: u32,
    /// Digital inputs 1-4
    pub digital_inputs: [u8; 4],
    /// User MISO word
    pub user_miso: u32,
    /// Drive timestamp [µs]
    pub timestamp: u32,
    /// Position demand internal value [inc]
    pub position_demand: i32,
    /// Velocity demand value
    pub velocity_demand: i32,
    /// Torque demand [‰ rated]
    pub torque_demand: i16,
}

/// Master → drive process data (RxPDO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveOutputs {
    /// CiA-402 control word (0x6040)
    pub control_word: u16,
    /// Modes of operation (0x6060)
    pub op_mode: i8,
    /// Target torque [‰ rated] (0x6071)
    pub target_torque: i16,
    /// Target position [inc] (0x607A)
    pub target_position: i32,
    /// Target velocity (0x60FF)
    pub target_velocity: i32,
    /// Torque offset (0x60B2)
    pub torque_offset: i16,
    /// Tuning command
    pub tuning_command: u32,
    /// Physical outputs
    pub physical_outputs: u32,
    /// Physical outputs bit mask
    pub bit_mask: u32,
    /// User MOSI word
    pub user_mosi: u32,
    /// Velocity offset (0x60B1)
    pub velocity_offset: i32,
}

impl DriveInputs {
    /// Packed size [bytes].
    pub const SIZE: usize = size_of::<u16>()
        + size_of::<i8>()
        + size_of::<i32>() * 2
        + size_of::<i16>()
        + size_of::<u16>() * 4
        + size_of::<u32>()
        + size_of::<u8>() * 4
        + size_of::<u32>() * 2
        + size_of::<i32>() * 2
        + size_of::<i16>();

    /// Byte offset of the status word.
    pub const STATUS_WORD_OFFSET: usize = 0;

    /// Decode from the start of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, PdoError> {
        let mut r = ImageReader::new(bytes, "input", Self::SIZE)?;
        Ok(Self {
            status_word: r.u16(),
            op_mode_display: r.i8(),
            position_value: r.i32(),
            velocity_value: r.i32(),
            torque_value: r.i16(),
            analog_inputs: [r.u16(), r.u16(), r.u16(), r.u16()],
            tuning_status: r.u32(),
            digital_inputs: [r.u8(), r.u8(), r.u8(), r.u8()],
            user_miso: r.u32(),
            timestamp: r.u32(),
            position_demand: r.i32(),
            velocity_demand: r.i32(),
            torque_demand: r.i16(),
        })
    }

    /// Encode into the start of `bytes` (used by simulated slaves).
    pub fn encode(&self, bytes: &mut [u8]) -> Result<(), PdoError> {
        let mut w = ImageWriter::new(bytes, "input", Self::SIZE)?;
        w.u16(self.status_word);
        w.i8(self.op_mode_display);
        w.i32(self.position_value);
        w.i32(self.velocity_value);
        w.i16(self.torque_value);
        for value in self.analog_inputs {
            w.u16(value);
        }
        w.u32(self.tuning_status);
        for value in self.digital_inputs {
            w.u8(value);
        }
        w.u32(self.user_miso);
        w.u32(self.timestamp);
        w.i32(self.position_demand);
        w.i32(self.velocity_demand);
        w.i16(self.torque_demand);
        Ok(())
    }

    /// Read only the status word.
    pub fn status_word(bytes: &[u8]) -> Result<u16, PdoError> {
        let mut r = ImageReader::new(bytes, "input", Self::STATUS_WORD_OFFSET + 2)?;
        Ok(r.u16())
    }
}

impl DriveOutputs {
    /// Packed size [bytes].
    pub const SIZE: usize = size_of::<u16>()
        + size_of::<i8>()
        + size_of::<i16>()
        + size_of::<i32>() * 2
        + size_of::<i16>()
        + size_of::<u32>() * 4
        + size_of::<i32>();

    /// Byte offset of the target torque.
    pub const TARGET_TORQUE_OFFSET: usize = 3;

    /// Decode from the start of `bytes` (used by simulated slaves).
    pub fn decode(bytes: &[u8]) -> Result<Self, PdoError> {
        let mut r = ImageReader::new(bytes, "output", Self::SIZE)?;
        Ok(Self {
            control_word: r.u16(),
            op_mode: r.i8(),
            target_torque: r.i16(),
            target_position: r.i32(),
            target_velocity: r.i32(),
            torque_offset: r.i16(),
            tuning_command: r.u32(),
            physical_outputs: r.u32(),
            bit_mask: r.u32(),
            user_mosi: r.u32(),
            velocity_offset: r.i32(),
        })
    }

    /// Encode into the start of `bytes`.
    pub fn encode(&self, bytes: &mut [u8]) -> Result<(), PdoError> {
        let mut w = ImageWriter::new(bytes, "output", Self::SIZE)?;
        w.u16(self.control_word);
        w.i8(self.op_mode);
        w.i16(self.target_torque);
        w.i32(self.target_position);
        w.i32(self.target_velocity);
        w.i16(self.torque_offset);
        w.u32(self.tuning_command);
        w.u32(self.physical_outputs);
        w.u32(self.bit_mask);
        w.u32(self.user_mosi);
        w.i32(self.velocity_offset);
        Ok(())
    }

    /// Overwrite only the target torque, leaving the other fields as the
    /// drive last received them.
    pub fn write_target_torque(bytes: &mut [u8], torque: i16) -> Result<(), PdoError> {
        let end = Self::TARGET_TORQUE_OFFSET + size_of::<i16>();
        let mut w = ImageWriter::new(bytes, "output", end)?;
        w.skip(Self::TARGET_TORQUE_OFFSET);
        w.i16(torque);
        Ok(())
    }
}

const_assert_eq!(DriveInputs::SIZE, 47);
const_assert_eq!(DriveOutputs::SIZE, 35);

/// Sequential little-endian reader over a length-checked slice.
struct ImageReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ImageReader<'a> {
    fn new(bytes: &'a [u8], direction: &'static str, required: usize) -> Result<Self, PdoError> {
        if bytes.len() < required {
            return Err(PdoError {
                direction,
                len: bytes.len(),
                required,
            });
        }
        Ok(Self { bytes, pos: 0 })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        u8::from_le_bytes(self.take())
    }

    fn i8(&mut self) -> i8 {
        i8::from_le_bytes(self.take())
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }
}

/// Sequential little-endian writer over a length-checked slice.
struct ImageWriter<'a> {
    bytes: &'a mut [u8],
    pos: usize,
}

impl<'a> ImageWriter<'a> {
    fn new(bytes: &'a mut [u8], direction: &'static str, required: usize) -> Result<Self, PdoError> {
        if bytes.len() < required {
            return Err(PdoError {
                direction,
                len: bytes.len(),
                required,
            });
        }
        Ok(Self { bytes, pos: 0 })
    }

    fn put<const N: usize>(&mut self, value: [u8; N]) {
        self.bytes[self.pos..self.pos + N].copy_from_slice(&value);
        self.pos += N;
    }

    fn skip(&mut self, n: usize) {
        self.pos += n;
    }

    fn u8(&mut self, value: u8) {
        self.put(value.to_le_bytes());
    }

    fn i8(&mut self, value: i8) {
        self.put(value.to_le_bytes());
    }

    fn u16(&mut self, value: u16) {
        self.put(value.to_le_bytes());
    }

    fn i16(&mut self, value: i16) {
        self.put(value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.put(value.to_le_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.put(value.to_le_bytes());
    }
}

/// Convert a joint effort to a drive torque setpoint, saturating at the
/// `i16` range. Non-finite input yields zero torque.
pub fn effort_to_torque(effort: f64, scale: f64) -> i16 {
    let raw = effort / scale;
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_is_little_endian() {
        let mut bytes = [0u8; DriveInputs::SIZE];
        bytes[0] = 0x37;
        bytes[1] = 0x02;
        assert_eq!(DriveInputs::status_word(&bytes).unwrap(), 0x0237);
        assert_eq!(DriveInputs::decode(&bytes).unwrap().status_word, 0x0237);
    }

    #[test]
    fn test_input_field_offsets() {
        let inputs = DriveInputs {
            status_word: 0x1234,
            op_mode_display: -3,
            position_value: -100_000,
            velocity_value: 2500,
            torque_value: -42,
            torque_demand: 7,
            ..Default::default()
        };
        let mut bytes = [0u8; DriveInputs::SIZE];
        inputs.encode(&mut bytes).unwrap();

        assert_eq!(&bytes[0..2], &[0x34, 0x12]);
        assert_eq!(bytes[2] as i8, -3);
        assert_eq!(i32::from_le_bytes([bytes[3], bytes[4], bytes[5], bytes[6]]), -100_000);
        assert_eq!(i32::from_le_bytes([bytes[7], bytes[8], bytes[9], bytes[10]]), 2500);
        assert_eq!(i16::from_le_bytes([bytes[11], bytes[12]]), -42);
        assert_eq!(i16::from_le_bytes([bytes[45], bytes[46]]), 7);
        assert_eq!(DriveInputs::decode(&bytes).unwrap(), inputs);
    }

    #[test]
    fn test_target_torque_only_touches_its_slot() {
        let mut bytes = [0xAAu8; DriveOutputs::SIZE];
        DriveOutputs::write_target_torque(&mut bytes, -300).unwrap();

        assert_eq!(&bytes[3..5], &(-300i16).to_le_bytes());
        assert!(bytes[..3].iter().all(|b| *b == 0xAA));
        assert!(bytes[5..].iter().all(|b| *b == 0xAA));
        assert_eq!(DriveOutputs::decode(&bytes).unwrap().target_torque, -300);
    }

    #[test]
    fn test_short_slice_rejected() {
        let bytes = [0u8; DriveInputs::SIZE - 1];
        let err = DriveInputs::decode(&bytes).unwrap_err();
        assert_eq!(err.required, DriveInputs::SIZE);
        assert_eq!(err.direction, "input");

        let mut bytes = [0u8; 4];
        assert!(DriveOutputs::write_target_torque(&mut bytes, 1).is_err());
    }

    #[test]
    fn test_effort_to_torque() {
        assert_eq!(effort_to_torque(12.4, 1.0), 12);
        assert_eq!(effort_to_torque(1.0, 0.01), 100);
        assert_eq!(effort_to_torque(1e9, 1.0), i16::MAX);
        assert_eq!(effort_to_torque(-1e9, 1.0), i16::MIN);
        assert_eq!(effort_to_torque(f64::NAN, 1.0), 0);
    }
}
