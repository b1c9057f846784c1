use avr_device::atmega128a::{EXINT, PORTA, PORTB, PORTC, PORTD, PORTE, PORTF};
use core::convert::Infallible;
use core::marker::PhantomData;
use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin, ToggleableOutputPin};

pub trait PinMode {}
pub struct Input;
pub struct Output;
impl PinMode for Input {}
impl PinMode for Output {}

#[derive(Debug)]
pub struct Pin<PORT, const PIN: u8, MODE> {
    _port: PhantomData<PORT>,
    _mode: PhantomData<MODE>,
}

impl<PORT, const P: u8, MODE> Pin<PORT, P, MODE> {
    /// Claims the pin. Two handles to the same pin race on the port register.
    pub const fn steal() -> Self {
        Pin {
            _port: PhantomData,
            _mode: PhantomData,
        }
    }
}

macro_rules! impl_port {
    ($PORT:ident, $port:ident, $ddr:ident, $pin:ident) => {
        impl<const P: u8, MODE: PinMode> Pin<$PORT, P, MODE> {
            pub fn into_output(self) -> Pin<$PORT, P, Output> {
                unsafe {
                    (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(r.bits() | (1 << P)));
                }
                Pin::steal()
            }

            /// Input with the internal pull-up enabled.
            pub fn into_pull_up_input(self) -> Pin<$PORT, P, Input> {
                unsafe {
                    (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(r.bits() & !(1 << P)));
                    (*$PORT::ptr()).$port.modify(|r, w| w.bits(r.bits() | (1 << P)));
                }
                Pin::steal()
            }
        }

        impl<const P: u8> OutputPin for Pin<$PORT, P, Output> {
            type Error = Infallible;

            fn set_low(&mut self) -> Result<(), Infallible> {
                avr_device::interrupt::free(|_| unsafe {
                    (*$PORT::ptr()).$port.modify(|r, w| w.bits(r.bits() & !(1 << P)));
                });
                Ok(())
            }

            fn set_high(&mut self) -> Result<(), Infallible> {
                avr_device::interrupt::free(|_| unsafe {
                    (*$PORT::ptr()).$port.modify(|r, w| w.bits(r.bits() | (1 << P)));
                });
                Ok(())
            }
        }

        impl<const P: u8> StatefulOutputPin for Pin<$PORT, P, Output> {
            fn is_set_high(&self) -> Result<bool, Infallible> {
                Ok(unsafe { (*$PORT::ptr()).$port.read().bits() } & (1 << P) != 0)
            }

            fn is_set_low(&self) -> Result<bool, Infallible> {
                self.is_set_high().map(|high| !high)
            }
        }

        impl<const P: u8> ToggleableOutputPin for Pin<$PORT, P, Output> {
            type Error = Infallible;

            fn toggle(&mut self) -> Result<(), Infallible> {
                if self.is_set_high()? {
                    self.set_low()
                } else {
                    self.set_high()
                }
            }
        }

        impl<const P: u8> InputPin for Pin<$PORT, P, Input> {
            type Error = Infallible;

            fn is_high(&self) -> Result<bool, Infallible> {
                Ok(unsafe { (*$PORT::ptr()).$pin.read().bits() } & (1 << P) != 0)
            }

            fn is_low(&self) -> Result<bool, Infallible> {
                self.is_high().map(|high| !high)
            }
        }
    };
}

impl_port!(PORTA, porta, ddra, pina);
impl_port!(PORTB, portb, ddrb, pinb);
impl_port!(PORTC, portc, ddrc, pinc);
impl_port!(PORTD, portd, ddrd, pind);
impl_port!(PORTE, porte, ddre, pine);
impl_port!(PORTF, portf, ddrf, pinf);

// EICRA / EIMSK
const ISC01: u8 = 1 << 1;
const INT0: u8 = 1 << 0;

/// Enables INT0 (PD0) on the falling edge. INT0 wakes the CPU from every sleep state.
pub fn enable_int0_falling_edge() {
    avr_device::interrupt::free(|_| unsafe {
        let p = EXINT::ptr();
        (*p).eicra.modify(|r, w| w.bits((r.bits() & !0b11) | ISC01));
        (*p).eimsk.modify(|r, w| w.bits(r.bits() | INT0));
    });
}

// BigAVR2 board-specific pin definitions
pub mod board {
    use super::*;

    pub type StatusLed = Pin<PORTA, 0, Output>;
    /// HIGH while the CPU is awake.
    pub type AwakeLed = Pin<PORTA, 7, Output>;
    /// Wired to INT0.
    pub type WakeButton = Pin<PORTD, 0, Input>;
}
