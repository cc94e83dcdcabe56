//! RGB lamp LED driver on three PWM channels.
//!
//! Implements the [`LightDriver`] port. The driver keeps the last power,
//! brightness and color request and recomputes the three duties on every
//! change:
//!
//! ```text
//!   duty = base_colour(temperature | hue+saturation) × brightness% × power
//! ```
//!
//! Channels are anything implementing `embedded_hal::pwm::SetDutyCycle`
//! (LEDC channels on target, recording fakes in tests).

use embedded_hal::pwm::SetDutyCycle;
use log::{debug, warn};

use crate::device::LightDriver;
use crate::error::DeviceError;

/// Colour as (R, G, B), each 0–255.
pub type Rgb = (u8, u8, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColourSource {
    Temperature { kelvin: u32 },
    HueSaturation { hue: u16, saturation: u8 },
}

pub struct RgbLightDriver<R, G, B> {
    red: R,
    green: G,
    blue: B,
    power: bool,
    brightness: u8,
    source: ColourSource,
}

impl<R, G, B> RgbLightDriver<R, G, B>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
{
    /// Defaults mirror the endpoint defaults: on, level 64/254, 4000 K.
    pub fn new(red: R, green: G, blue: B) -> Self {
        Self {
            red,
            green,
            blue,
            power: true,
            brightness: 25,
            source: ColourSource::Temperature { kelvin: 4000 },
        }
    }

    pub fn is_on(&self) -> bool {
        self.power
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Colour currently emitted, after brightness and power.
    pub fn output(&self) -> Rgb {
        if !self.power {
            return (0, 0, 0);
        }
        let (r, g, b) = match self.source {
            ColourSource::Temperature { kelvin } => kelvin_to_rgb(kelvin),
            ColourSource::HueSaturation { hue, saturation } => hsv_to_rgb(hue, saturation),
        };
        let scale = |c: u8| (u16::from(c) * u16::from(self.brightness) / 100) as u8;
        (scale(r), scale(g), scale(b))
    }

    fn apply(&mut self) -> Result<(), DeviceError> {
        let (r, g, b) = self.output();
        debug!("LED: rgb=({}, {}, {})", r, g, b);
        let res = self
            .red
            .set_duty_cycle_fraction(u16::from(r), 255)
            .map_err(|e| warn!("LED: red duty failed: {:?}", e))
            .and_then(|()| {
                self.green
                    .set_duty_cycle_fraction(u16::from(g), 255)
                    .map_err(|e| warn!("LED: green duty failed: {:?}", e))
            })
            .and_then(|()| {
                self.blue
                    .set_duty_cycle_fraction(u16::from(b), 255)
                    .map_err(|e| warn!("LED: blue duty failed: {:?}", e))
            });
        res.map_err(|()| DeviceError::Driver)
    }
}

impl<R, G, B> LightDriver for RgbLightDriver<R, G, B>
where
    R: SetDutyCycle,
    G: SetDutyCycle,
    B: SetDutyCycle,
{
    fn set_power(&mut self, on: bool) -> Result<(), DeviceError> {
        self.power = on;
        self.apply()
    }

    fn set_brightness(&mut self, percent: u8) -> Result<(), DeviceError> {
        self.brightness = percent.min(100);
        self.apply()
    }

    fn set_hue(&mut self, degrees: u16) -> Result<(), DeviceError> {
        let saturation = match self.source {
            ColourSource::HueSaturation { saturation, .. } => saturation,
            ColourSource::Temperature { .. } => 100,
        };
        self.source = ColourSource::HueSaturation {
            hue: degrees % 360,
            saturation,
        };
        self.apply()
    }

    fn set_saturation(&mut self, percent: u8) -> Result<(), DeviceError> {
        let hue = match self.source {
            ColourSource::HueSaturation { hue, .. } => hue,
            ColourSource::Temperature { .. } => 0,
        };
        self.source = ColourSource::HueSaturation {
            hue,
            saturation: percent.min(100),
        };
        self.apply()
    }

    fn set_temperature(&mut self, kelvin: u32) -> Result<(), DeviceError> {
        self.source = ColourSource::Temperature { kelvin };
        self.apply()
    }
}

/// Full-value HSV to RGB. `hue` in degrees, `saturation` in percent.
pub fn hsv_to_rgb(hue: u16, saturation: u8) -> Rgb {
    let h = u32::from(hue % 360);
    let s = u32::from(saturation.min(100));
    let max = 255u32;
    let min = max * (100 - s) / 100;
    let sector = h / 60;
    let ramp = (max - min) * (h % 60) / 60;
    let (r, g, b) = match sector {
        0 => (max, min + ramp, min),
        1 => (max - ramp, max, min),
        2 => (min, max, min + ramp),
        3 => (min, max - ramp, max),
        4 => (min + ramp, min, max),
        _ => (max, min, max - ramp),
    };
    (r as u8, g as u8, b as u8)
}

/// Black-body approximation for 1000–40000 K.
pub fn kelvin_to_rgb(kelvin: u32) -> Rgb {
    let t = kelvin.clamp(1000, 40_000) as f32 / 100.0;
    let clamp = |v: f32| v.clamp(0.0, 255.0) as u8;

    let r = if t <= 66.0 {
        255.0
    } else {
        329.698_73 * (t - 60.0).powf(-0.133_204_76)
    };
    let g = if t <= 66.0 {
        99.470_8 * t.ln() - 161.119_57
    } else {
        288.122_16 * (t - 60.0).powf(-0.075_514_85)
    };
    let b = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_73 * (t - 10.0).ln() - 305.044_8
    };
    (clamp(r), clamp(g), clamp(b))
}
