// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{any::Any, error::Error as StdError};

use http::StatusCode as HttpStatusCode;
use serde::Serialize;
use snafu::Snafu;
use strum::EnumProperty;

/// Error categories shared by every bandprobe surface, each carrying the HTTP
/// status it renders as.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Serialize,
    strum_macros::EnumProperty,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatusCode {
    #[strum(props(http_status = "400"))]
    InvalidArgument,
    #[strum(props(http_status = "404"))]
    NotFound,
    #[strum(props(http_status = "416"))]
    RangeNotSatisfiable,
    #[strum(props(http_status = "500"))]
    Internal,
    #[strum(props(http_status = "500"))]
    Unknown,
}

impl StatusCode {
    pub fn http_status(self) -> HttpStatusCode {
        self.get_str("http_status")
            .and_then(|value| value.parse::<u16>().ok())
            .and_then(|value| HttpStatusCode::from_u16(value).ok())
            .unwrap_or(HttpStatusCode::INTERNAL_SERVER_ERROR)
    }
}

pub trait StackError: StdError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>);

    fn next(&self) -> Option<&dyn StackError>;

    fn last(&self) -> &dyn StackError
    where
        Self: Sized,
    {
        let Some(mut result) = self.next() else {
            return self;
        };
        while let Some(err) = result.next() {
            result = err;
        }
        result
    }

    fn transparent(&self) -> bool { false }
}

pub trait ErrorExt: StackError {
    fn status_code(&self) -> StatusCode { StatusCode::Unknown }

    fn as_any(&self) -> &dyn Any;

    /// Message safe to hand to a client. Internal failures are masked.
    fn output_msg(&self) -> String
    where
        Self: Sized,
    {
        match self.status_code() {
            StatusCode::Unknown | StatusCode::Internal => {
                format!("Internal error: {}", self.status_code() as u32)
            }
            _ => {
                let error = self.last();
                if let Some(external_error) = error.source() {
                    let mut root = external_error;
                    while let Some(source) = root.source() {
                        root = source;
                    }
                    if error.transparent() {
                        format!("{root}")
                    } else {
                        format!("{error}: {root}")
                    }
                } else {
                    format!("{error}")
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(transparent)]
    Network {
        source: NetworkError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum NetworkError {
    #[snafu(display("Failed to bind {addr}"))]
    Bind {
        addr:   String,
        #[snafu(source)]
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to parse address {addr}"))]
    ParseAddress {
        addr:   String,
        #[snafu(source)]
        source: std::net::AddrParseError,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(StatusCode::NotFound.http_status(), HttpStatusCode::NOT_FOUND);
        assert_eq!(
            StatusCode::RangeNotSatisfiable.http_status(),
            HttpStatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            StatusCode::Unknown.http_status(),
            HttpStatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_status_code_parses_snake_case() {
        assert_eq!(
            "range_not_satisfiable".parse::<StatusCode>().unwrap(),
            StatusCode::RangeNotSatisfiable
        );
        assert!("teapot".parse::<StatusCode>().is_err());
    }
}
