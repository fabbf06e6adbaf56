//! Call-data codec
//!
//! Call data has the wire form `function@hexarg1@hexarg2…`. An empty segment
//! between separators is an empty argument.

use thiserror::Error;

/// Separator between the function name and the arguments
pub const ARGUMENT_SEPARATOR: u8 = b'@';

/// Call-data parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallDataError {
    #[error("Empty call data")]
    EmptyData,
    #[error("Missing function name")]
    MissingFunction,
    #[error("Function name is not valid UTF-8")]
    InvalidFunctionName,
    #[error("Invalid hex in argument {index}: {reason}")]
    InvalidArgument { index: usize, reason: String },
}

/// Splits raw call data into a function name and decoded arguments
pub trait CallArgsParser {
    fn parse_data(&self, data: &[u8]) -> Result<(String, Vec<Vec<u8>>), CallDataError>;
}

/// Parser for the `function@hex@hex` format
#[derive(Debug, Clone, Copy, Default)]
pub struct HexCallArgsParser;

impl CallArgsParser for HexCallArgsParser {
    fn parse_data(&self, data: &[u8]) -> Result<(String, Vec<Vec<u8>>), CallDataError> {
        if data.is_empty() {
            return Err(CallDataError::EmptyData);
        }

        let mut segments = data.split(|byte| *byte == ARGUMENT_SEPARATOR);
        let function = segments.next().unwrap_or_default();
        if function.is_empty() {
            return Err(CallDataError::MissingFunction);
        }
        let function =
            String::from_utf8(function.to_vec()).map_err(|_| CallDataError::InvalidFunctionName)?;

        let arguments = segments
            .enumerate()
            .map(|(index, segment)| {
                hex::decode(segment).map_err(|e| CallDataError::InvalidArgument {
                    index,
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((function, arguments))
    }
}

/// Encode a function name and arguments as call data
pub fn build_call_data(function: &str, arguments: &[Vec<u8>]) -> Vec<u8> {
    let mut data = function.as_bytes().to_vec();
    for argument in arguments {
        data.push(ARGUMENT_SEPARATOR);
        data.extend_from_slice(hex::encode(argument).as_bytes());
    }
    data
}
