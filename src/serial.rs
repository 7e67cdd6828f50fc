//! Serial line settings.
//!
//! These carry no protocol logic, each option is handed straight to the
//! operating system driver which decides whether it can honour it.
use crate::{FirmataError, Result};
use serde::{Deserialize, Serialize};
use tokio_serial::SerialPort;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// One independently settable line option.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SerialOption {
    BaudRate(u32),
    FlowControl(FlowControl),
    Parity(Parity),
    StopBits(StopBits),
    CharSize(u8),
}

impl From<FlowControl> for tokio_serial::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
            FlowControl::Software => Self::Software,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

fn stop_bits(bits: StopBits) -> Option<tokio_serial::StopBits> {
    match bits {
        StopBits::One => Some(tokio_serial::StopBits::One),
        StopBits::Two => Some(tokio_serial::StopBits::Two),
        StopBits::OnePointFive => None,
    }
}

fn data_bits(bits: u8) -> Option<tokio_serial::DataBits> {
    match bits {
        5 => Some(tokio_serial::DataBits::Five),
        6 => Some(tokio_serial::DataBits::Six),
        7 => Some(tokio_serial::DataBits::Seven),
        8 => Some(tokio_serial::DataBits::Eight),
        _ => None,
    }
}

/// Applies `option` to an open serial port.
/// # Errors
/// Returns [`FirmataError::OptionRejected`] if the driver refuses the value or
/// the value cannot be expressed to the driver at all.
pub fn apply_option(port: &mut dyn SerialPort, option: SerialOption) -> Result<()> {
    let rejected = |reason: String| FirmataError::OptionRejected(option, reason);
    let applied = match option {
        SerialOption::BaudRate(baud) => port.set_baud_rate(baud),
        SerialOption::FlowControl(flow) => port.set_flow_control(flow.into()),
        SerialOption::Parity(parity) => port.set_parity(parity.into()),
        SerialOption::StopBits(bits) => {
            let bits = stop_bits(bits)
                .ok_or_else(|| rejected("unsupported stop bit count".to_owned()))?;
            port.set_stop_bits(bits)
        }
        SerialOption::CharSize(bits) => {
            let bits =
                data_bits(bits).ok_or_else(|| rejected("character size must be 5..=8".to_owned()))?;
            port.set_data_bits(bits)
        }
    };
    applied.map_err(|e| rejected(e.to_string()))?;
    tracing::debug!(?option, "serial option applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_size_outside_driver_range_has_no_mapping() {
        assert_eq!(data_bits(8), Some(tokio_serial::DataBits::Eight));
        assert_eq!(data_bits(5), Some(tokio_serial::DataBits::Five));
        assert_eq!(data_bits(4), None);
        assert_eq!(data_bits(9), None);
    }

    #[test]
    fn one_and_a_half_stop_bits_cannot_be_expressed() {
        assert_eq!(stop_bits(StopBits::One), Some(tokio_serial::StopBits::One));
        assert_eq!(stop_bits(StopBits::OnePointFive), None);
    }

    #[test]
    fn options_use_snake_case_names() {
        let option: SerialOption = serde_json::from_str(r#"{"stop_bits":"one_point_five"}"#).unwrap();
        assert_eq!(option, SerialOption::StopBits(StopBits::OnePointFive));
        let option: SerialOption = serde_json::from_str(r#"{"baud_rate":115200}"#).unwrap();
        assert_eq!(option, SerialOption::BaudRate(115_200));
    }
}
