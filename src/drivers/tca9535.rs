//! TCA9535 16-bit I²C I/O expander.
//!
//! Port 0 is all inputs (buttons, coin, stop), port 1 all outputs
//! (relays). Generic over any [`embedded_hal::i2c::I2c`] bus so the same
//! driver runs on `esp_idf_hal::i2c::I2cDriver` and on a test fake.
//!
//! The output register is cached: [`Tca9535::set_output_bit`] does a
//! single register write instead of a read-modify-write round trip.

use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::error::BusError;
use crate::pins::reg;

pub struct Tca9535<I2C> {
    i2c: I2C,
    address: u8,
    output_cache: u8,
}

impl<I2C: I2c> Tca9535<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            output_cache: 0,
        }
    }

    /// Port 0 → inputs, port 1 → outputs, every output low.
    pub fn init(&mut self) -> Result<(), BusError> {
        self.write_register(reg::CONFIG_PORT0, 0xFF)?;
        self.write_register(reg::CONFIG_PORT1, 0x00)?;
        self.write_register(reg::POLARITY_PORT0, 0x00)?;
        self.write_register(reg::OUTPUT_PORT1, 0x00)?;
        self.output_cache = 0;
        info!("tca9535: initialised at 0x{:02X}", self.address);
        Ok(())
    }

    /// Raw level of port 0 (bit set = line high = released).
    pub fn read_inputs(&mut self) -> Result<u8, BusError> {
        self.read_register(reg::INPUT_PORT0)
    }

    /// Current state of port 1 as read back from the output register.
    pub fn read_outputs(&mut self) -> Result<u8, BusError> {
        let value = self.read_register(reg::OUTPUT_PORT1)?;
        self.output_cache = value;
        Ok(value)
    }

    /// Drive one port-1 line.
    pub fn set_output_bit(&mut self, bit: u8, on: bool) -> Result<(), BusError> {
        if bit > 7 {
            return Err(BusError::Transfer);
        }
        let next = if on {
            self.output_cache | (1 << bit)
        } else {
            self.output_cache & !(1 << bit)
        };
        self.write_register(reg::OUTPUT_PORT1, next)?;
        self.output_cache = next;
        Ok(())
    }

    pub fn release(self) -> I2C {
        self.i2c
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    fn read_register(&mut self, register: u8) -> Result<u8, BusError> {
        let mut buf = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|_| {
                warn!("tca9535: read of register 0x{:02X} failed", register);
                BusError::Transfer
            })?;
        Ok(buf[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|_| {
                warn!("tca9535: write of register 0x{:02X} failed", register);
                BusError::Transfer
            })
    }
}
