//! One I2C peripheral shared by drivers written against different
//! embedded-hal releases. Every device is an `embedded_hal_bus` handle on the
//! same mutex; drivers still on 0.2 get theirs wrapped in [`Eh02I2c`].

pub use embedded_hal_bus::i2c::MutexDevice;

use embedded_hal::i2c::I2c;

/// Presents an embedded-hal 1.0 device through the 0.2 blocking traits.
pub struct Eh02I2c<I2C>(pub I2C);

impl<I2C: I2c> embedded_hal_0_2::blocking::i2c::Read for Eh02I2c<I2C> {
    type Error = I2C::Error;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(address, buffer)
    }
}

impl<I2C: I2c> embedded_hal_0_2::blocking::i2c::Write for Eh02I2c<I2C> {
    type Error = I2C::Error;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        self.0.write(address, bytes)
    }
}

impl<I2C: I2c> embedded_hal_0_2::blocking::i2c::WriteRead for Eh02I2c<I2C> {
    type Error = I2C::Error;

    fn write_read(
        &mut self,
        address: u8,
        bytes: &[u8],
        buffer: &mut [u8],
    ) -> Result<(), Self::Error> {
        self.0.write_read(address, bytes, buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
    use embedded_hal_0_2::blocking::i2c::{Write as _, WriteRead as _};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
        reply: u8,
    }

    impl ErrorType for RecordingBus {
        type Error = ErrorKind;
    }

    impl I2c for RecordingBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for operation in operations {
                match operation {
                    Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                    Operation::Read(buffer) => buffer.fill(self.reply),
                }
            }
            Ok(())
        }
    }

    #[test]
    fn both_trait_versions_reach_the_same_bus() {
        let bus = Mutex::new(RecordingBus {
            reply: 0x61,
            ..RecordingBus::default()
        });
        let mut bme280 = MutexDevice::new(&bus);
        let mut bme68x = Eh02I2c(MutexDevice::new(&bus));

        I2c::write(&mut bme280, 0x76, &[0xf4, 0x25]).unwrap();
        bme68x.write(0x77, &[0xe0, 0xb6]).unwrap();
        let mut chip_id = [0_u8; 1];
        bme68x.write_read(0x77, &[0xd0], &mut chip_id).unwrap();

        assert_eq!(chip_id, [0x61]);
        assert_eq!(
            bus.lock().unwrap().writes,
            vec![
                (0x76, vec![0xf4, 0x25]),
                (0x77, vec![0xe0, 0xb6]),
                (0x77, vec![0xd0]),
            ]
        );
    }

    #[test]
    fn read_fills_from_the_device() {
        let bus = Mutex::new(RecordingBus {
            reply: 0x42,
            ..RecordingBus::default()
        });
        let mut device = Eh02I2c(MutexDevice::new(&bus));
        let mut frame = [0_u8; 4];

        embedded_hal_0_2::blocking::i2c::Read::read(&mut device, 0x08, &mut frame).unwrap();

        assert_eq!(frame, [0x42; 4]);
        assert!(bus.lock().unwrap().writes.is_empty());
    }
}
