use uuid::Uuid;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("{layout} payload too short: need {expected} bytes, got {actual}")]
    TooShort {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("advertisement `{0}` is not valid hex")]
    InvalidHex(String),
    #[error("unknown temperature unit code {0:#04x}")]
    UnknownUnit(u8),
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to decode payload: {0}")]
    Decode(#[from] DecodeError),
    #[error("no {0} received from device within the timeout")]
    NoData(&'static str),
    #[error("characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),
    #[error("cannot find bluetooth adapter")]
    NoAdapter,
    #[error("bluetooth device not found")]
    DeviceNotFound,
    #[error("`{0}` is not a valid bluetooth address")]
    InvalidAddress(String),
    #[error("fail to connect to device `{1}`: {0}")]
    FailedToConnect(btleplug::Error, String),
    #[error("error during bluetooth operation when {1}: {0}")]
    Bluetooth(btleplug::Error, &'static str),
    #[error("device disconnected")]
    Disconnected,
    #[error("bluetooth backend is dead")]
    BackendDead,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
