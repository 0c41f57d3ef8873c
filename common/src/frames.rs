//! Plantower-style frames shared by the PMSx003 particulate sensor and the
//! DS-CO2-20 CO2 sensor.
//!
//! Layout: `0x42 0x4d`, a big-endian body length, the body, and a big-endian
//! checksum that is the wrapping sum of every byte before it. The declared
//! length includes the two checksum bytes.

use log::debug;

use crate::{error::FrameError, types::ParticleCounts};

pub const START_BYTE: u8 = 0x42;
pub const MAGIC: [u8; 2] = [START_BYTE, 0x4d];

const HEADER_LEN: usize = 4;
const MIN_FRAME_LEN: usize = HEADER_LEN + 2;

pub const PMS_FRAME_LEN: usize = 32;
pub const CO2_FRAME_LEN: usize = 12;

/// Ask a DS-CO2-20 on a serial link for one reading.
pub const CO2_READ_COMMAND: [u8; 7] = [0x42, 0x4d, 0xe3, 0x00, 0x00, 0x01, 0x72];

fn be_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

pub fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0_u16, |sum, byte| sum.wrapping_add(u16::from(*byte)))
}

/// Checks magic, length and checksum. Returns the number of bytes the frame
/// actually occupies, which may be less than `buf.len()`.
pub fn verify(buf: &[u8]) -> Result<usize, FrameError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort {
            len: buf.len(),
            min: MIN_FRAME_LEN,
        });
    }

    if buf[..2] != MAGIC {
        return Err(FrameError::BadMagic {
            found: [buf[0], buf[1]],
        });
    }

    let declared = HEADER_LEN + usize::from(be_u16(buf, 2));
    if declared < MIN_FRAME_LEN || declared > buf.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            available: buf.len(),
        });
    }
    if declared < buf.len() {
        debug!(
            "frame uses {declared} of {} buffered bytes; ignoring the rest",
            buf.len()
        );
    }

    let checksum_offset = declared - 2;
    let calculated = checksum(&buf[..checksum_offset]);
    let received = be_u16(buf, checksum_offset);
    if calculated != received {
        return Err(FrameError::Checksum {
            calculated,
            received,
        });
    }

    Ok(declared)
}

fn require_len(buf: &[u8], min: usize) -> Result<(), FrameError> {
    if buf.len() < min {
        return Err(FrameError::TooShort {
            len: buf.len(),
            min,
        });
    }
    Ok(())
}

/// One PMSx003 measurement. Concentrations are in µg/m³.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmsFrame {
    pub pm1_0_standard: u16,
    pub pm2_5_standard: u16,
    pub pm10_0_standard: u16,
    pub pm1_0: u16,
    pub pm2_5: u16,
    pub pm10_0: u16,
    pub particles: ParticleCounts,
}

impl PmsFrame {
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        require_len(buf, PMS_FRAME_LEN)?;
        verify(buf)?;

        Ok(Self {
            pm1_0_standard: be_u16(buf, 4),
            pm2_5_standard: be_u16(buf, 6),
            pm10_0_standard: be_u16(buf, 8),
            pm1_0: be_u16(buf, 10),
            pm2_5: be_u16(buf, 12),
            pm10_0: be_u16(buf, 14),
            particles: ParticleCounts {
                gt_0_3um: be_u16(buf, 16),
                gt_0_5um: be_u16(buf, 18),
                gt_1_0um: be_u16(buf, 20),
                gt_2_5um: be_u16(buf, 22),
                gt_5_0um: be_u16(buf, 24),
                gt_10um: be_u16(buf, 26),
            },
        })
    }

    /// Builds the bytes a sensor would send for this measurement.
    pub fn encode(&self) -> [u8; PMS_FRAME_LEN] {
        let mut buf = [0_u8; PMS_FRAME_LEN];
        buf[..2].copy_from_slice(&MAGIC);
        buf[2..4].copy_from_slice(&((PMS_FRAME_LEN - HEADER_LEN) as u16).to_be_bytes());

        let words = [
            self.pm1_0_standard,
            self.pm2_5_standard,
            self.pm10_0_standard,
            self.pm1_0,
            self.pm2_5,
            self.pm10_0,
            self.particles.gt_0_3um,
            self.particles.gt_0_5um,
            self.particles.gt_1_0um,
            self.particles.gt_2_5um,
            self.particles.gt_5_0um,
            self.particles.gt_10um,
        ];
        for (slot, word) in words.iter().enumerate() {
            let offset = HEADER_LEN + slot * 2;
            buf[offset..offset + 2].copy_from_slice(&word.to_be_bytes());
        }

        seal(&mut buf);
        buf
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Co2Frame {
    pub co2_ppm: u16,
    pub calibration: [u16; 2],
}

impl Co2Frame {
    pub fn parse(buf: &[u8]) -> Result<Self, FrameError> {
        require_len(buf, CO2_FRAME_LEN)?;
        verify(buf)?;

        Ok(Self {
            co2_ppm: be_u16(buf, 4),
            calibration: [be_u16(buf, 6), be_u16(buf, 8)],
        })
    }

    pub fn encode(&self) -> [u8; CO2_FRAME_LEN] {
        let mut buf = [0_u8; CO2_FRAME_LEN];
        buf[..2].copy_from_slice(&MAGIC);
        buf[2..4].copy_from_slice(&((CO2_FRAME_LEN - HEADER_LEN) as u16).to_be_bytes());
        buf[4..6].copy_from_slice(&self.co2_ppm.to_be_bytes());
        buf[6..8].copy_from_slice(&self.calibration[0].to_be_bytes());
        buf[8..10].copy_from_slice(&self.calibration[1].to_be_bytes());
        seal(&mut buf);
        buf
    }
}

fn seal(buf: &mut [u8]) {
    let offset = buf.len() - 2;
    let sum = checksum(&buf[..offset]);
    buf[offset..].copy_from_slice(&sum.to_be_bytes());
}

/// Reassembles fixed-size frames from a serial byte stream. Bytes before a
/// start byte are dropped, so the assembler resynchronizes after line noise
/// or a frame that was cut short.
#[derive(Debug, Clone)]
pub struct FrameAssembler<const N: usize> {
    buf: [u8; N],
    filled: usize,
    skipped: usize,
}

impl<const N: usize> Default for FrameAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> FrameAssembler<N> {
    pub fn new() -> Self {
        Self {
            buf: [0; N],
            filled: 0,
            skipped: 0,
        }
    }

    /// Bytes discarded while hunting for a start byte.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Bytes still needed to complete the frame in progress.
    pub fn remaining(&self) -> usize {
        N - self.filled
    }

    pub fn reset(&mut self) {
        self.filled = 0;
    }

    pub fn push(&mut self, byte: u8) -> Option<[u8; N]> {
        if self.filled == 0 && byte != START_BYTE {
            self.skipped = self.skipped.saturating_add(1);
            return None;
        }

        self.buf[self.filled] = byte;
        self.filled += 1;

        if self.filled == N {
            self.filled = 0;
            return Some(self.buf);
        }
        None
    }

    /// Feeds a chunk and returns the first frame it completes. Bytes after
    /// that frame stay unread in `chunk[consumed..]`.
    pub fn extend(&mut self, chunk: &[u8]) -> (Option<[u8; N]>, usize) {
        for (consumed, byte) in chunk.iter().enumerate() {
            if let Some(frame) = self.push(*byte) {
                return (Some(frame), consumed + 1);
            }
        }
        (None, chunk.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_pms() -> PmsFrame {
        PmsFrame {
            pm1_0_standard: 4,
            pm2_5_standard: 7,
            pm10_0_standard: 9,
            pm1_0: 3,
            pm2_5: 6,
            pm10_0: 8,
            particles: ParticleCounts {
                gt_0_3um: 912,
                gt_0_5um: 270,
                gt_1_0um: 44,
                gt_2_5um: 5,
                gt_5_0um: 2,
                gt_10um: 0,
            },
        }
    }

    #[test]
    fn parses_captured_pms_frame() {
        let raw: [u8; 32] = [
            0x42, 0x4d, 0x00, 0x1c, 0x00, 0x05, 0x00, 0x08, 0x00, 0x0a, 0x00, 0x05, 0x00, 0x08,
            0x00, 0x0a, 0x03, 0x8a, 0x01, 0x0e, 0x00, 0x32, 0x00, 0x06, 0x00, 0x02, 0x00, 0x01,
            0x97, 0x00, 0x02, 0x47,
        ];

        let frame = PmsFrame::parse(&raw).unwrap();

        assert_eq!(frame.pm2_5, 8);
        assert_eq!(frame.pm10_0, 10);
        assert_eq!(frame.particles.gt_0_3um, 906);
        assert_eq!(frame.particles.gt_10um, 1);
    }

    #[test]
    fn encoded_pms_frame_verifies() {
        let bytes = sample_pms().encode();
        assert_eq!(verify(&bytes), Ok(PMS_FRAME_LEN));
        assert_eq!(PmsFrame::parse(&bytes), Ok(sample_pms()));
    }

    #[test]
    fn corrupted_byte_fails_checksum() {
        let mut bytes = sample_pms().encode();
        bytes[12] ^= 0x01;

        assert!(matches!(
            PmsFrame::parse(&bytes),
            Err(FrameError::Checksum { .. })
        ));
    }

    #[test]
    fn rejects_bad_magic_and_short_buffers() {
        let mut bytes = sample_pms().encode();
        bytes[1] = 0x4e;
        assert_eq!(
            verify(&bytes),
            Err(FrameError::BadMagic {
                found: [0x42, 0x4e]
            })
        );

        assert_eq!(
            Co2Frame::parse(&[0x42, 0x4d, 0x00]),
            Err(FrameError::TooShort { len: 3, min: 12 })
        );
    }

    #[test]
    fn declared_length_past_buffer_is_rejected() {
        let mut bytes = Co2Frame {
            co2_ppm: 650,
            calibration: [0, 0],
        }
        .encode();
        bytes[3] = 0x40;

        assert_eq!(
            verify(&bytes),
            Err(FrameError::LengthMismatch {
                declared: 68,
                available: 12
            })
        );
    }

    #[test]
    fn parses_co2_frame() {
        let raw: [u8; 12] = [
            0x42, 0x4d, 0x00, 0x08, 0x02, 0x9a, 0x00, 0x01, 0x00, 0x02, 0x01, 0x36,
        ];

        assert_eq!(
            Co2Frame::parse(&raw),
            Ok(Co2Frame {
                co2_ppm: 666,
                calibration: [1, 2],
            })
        );
    }

    #[test]
    fn co2_read_command_carries_its_own_checksum() {
        let body = &CO2_READ_COMMAND[..5];
        assert_eq!(checksum(body).to_be_bytes(), [0x01, 0x72]);
    }

    #[test]
    fn assembler_skips_noise_and_splits_chunks() {
        let frame = sample_pms().encode();
        let mut stream = vec![0x00, 0xff, 0x13];
        stream.extend_from_slice(&frame[..10]);

        let mut assembler = FrameAssembler::<PMS_FRAME_LEN>::new();
        assert_eq!(assembler.extend(&stream), (None, stream.len()));
        assert_eq!(assembler.skipped(), 3);
        assert_eq!(assembler.remaining(), PMS_FRAME_LEN - 10);

        let mut rest = frame[10..].to_vec();
        rest.extend_from_slice(&frame[..4]);
        let (assembled, consumed) = assembler.extend(&rest);

        assert_eq!(assembled, Some(frame));
        assert_eq!(consumed, PMS_FRAME_LEN - 10);
    }

    #[test]
    fn reads_capped_at_remaining_never_strand_bytes() {
        let first = sample_pms().encode();
        let second = PmsFrame {
            pm2_5: 41,
            ..sample_pms()
        }
        .encode();
        let mut stream = vec![0x00, 0x4d, 0x13];
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&[0xff, 0x00]);
        stream.extend_from_slice(&second);

        let mut assembler = FrameAssembler::<PMS_FRAME_LEN>::new();
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < stream.len() {
            // The serial driver hands back at most 7 bytes per call.
            let want = assembler.remaining().min(7).min(stream.len() - offset);
            let chunk = &stream[offset..offset + want];
            offset += want;

            let (frame, consumed) = assembler.extend(chunk);
            assert_eq!(consumed, chunk.len());
            frames.extend(frame);
        }

        assert_eq!(frames, vec![first, second]);
        assert_eq!(assembler.skipped(), 5);
    }
}
