// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the HAL Net library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use snafu::{ensure, ErrorCompat, IntoError, Snafu};
use std::convert::TryFrom;
use surf::StatusCode;

/// Errors which can be carried across the transport boundary.
///
/// A failed request surfaces on the client as a [surf::Error]. If the body of the error response
/// can be deserialized as the API's error type it is downcasted to that type, otherwise it is
/// converted to a [String] using [Display](std::fmt::Display) and lifted with `catch_all`. The
/// `client` module provides a middleware handler that does this automatically.
pub trait Error: std::error::Error + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn catch_all(msg: String) -> Self;
    fn status(&self) -> StatusCode;

    /// Convert from a generic client-side error to a specific error type.
    ///
    /// If `source` can be downcast to `Self`, it is simply downcasted. Otherwise, it is converted
    /// to a [String] using [Display](std::fmt::Display) and then converted to `Self` using
    /// [catch_all](Error::catch_all).
    fn from_client_error(source: surf::Error) -> Self {
        match source.downcast::<Self>() {
            Ok(err) => err,
            Err(err) => Self::catch_all(err.to_string()),
        }
    }
}

/// Everything that can go wrong between a caller and a materialized resource graph.
///
/// Classification ambiguity is never an error inside the materializer (it yields `None`); the
/// variants here are raised at the boundaries: missing required input, an unsupported method on
/// a custom query, a payload of the wrong shape where a specific shape was demanded, or a failure
/// passed through from the transport.
#[derive(Clone, Debug, Snafu, Serialize, Deserialize, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum HalError {
    #[snafu(display("required parameter '{}' is null, undefined or empty", param))]
    Validation { param: String },

    #[snafu(display("payload is not resource-shaped, expected {}", expected))]
    NotResourceShaped { expected: String },

    #[snafu(display("allowed only GET/POST/PUT/PATCH http methods, got {}", method))]
    UnsupportedMethod { method: String },

    #[snafu(display("no link found for relation '{}'", relation))]
    RelationNotFound { relation: String },

    #[snafu(display("resource type registration failed: {}", message))]
    Registration { message: String },

    #[snafu(display("invalid configuration: {}", message))]
    Config { message: String },

    #[snafu(display("transport error ({}): {}", status, message))]
    Transport { status: u16, message: String },
}

impl Error for HalError {
    fn catch_all(msg: String) -> Self {
        Self::Transport {
            status: u16::from(StatusCode::InternalServerError),
            message: msg,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Config { .. } | Self::Registration { .. } => {
                StatusCode::BadRequest
            }
            Self::NotResourceShaped { .. } => StatusCode::UnprocessableEntity,
            Self::UnsupportedMethod { .. } => StatusCode::MethodNotAllowed,
            Self::RelationNotFound { .. } => StatusCode::NotFound,
            Self::Transport { status, .. } => {
                StatusCode::try_from(*status).unwrap_or(StatusCode::InternalServerError)
            }
        }
    }

    // Keep the status of the failed exchange even when the body was not one of ours.
    fn from_client_error(source: surf::Error) -> Self {
        let status = u16::from(source.status());
        match source.downcast::<Self>() {
            Ok(err) => err,
            Err(err) => Self::Transport {
                status,
                message: err.to_string(),
            },
        }
    }
}

/// Context for embedding network client errors into specific error types.
///
/// This type implements the [IntoError] trait from SNAFU, so it can be used with
/// [ResultExt::context](snafu::ResultExt::context) just like automatically generated SNAFU
/// contexts.
///
/// Calling `some_result.context(ClientError)` will convert a potential error from a [surf::Error]
/// to a specific error type `E` using the method `E::from_client_error`, provided by the
/// [Error] trait.
pub struct ClientError;

impl<E: Error + ErrorCompat + std::error::Error> IntoError<E> for ClientError {
    type Source = surf::Error;

    fn into_error(self, source: Self::Source) -> E {
        E::from_client_error(source)
    }
}

/// Convert a concrete error type into a client error.
///
/// The error is first converted into an [Error] using the [Into] instance. That error is then
/// upcasted into an anyhow error to be embedded in the [surf::Error], so that it can be recovered
/// on the other side of the middleware stack with [ClientError].
pub fn client_error<E: Error>(error: impl Into<E>) -> surf::Error {
    let error = error.into();
    surf::Error::new(error.status(), error)
}

/// Fail with [HalError::Validation] when a required string input is empty.
pub fn require(param: &str, value: &str) -> Result<(), HalError> {
    ensure!(!value.trim().is_empty(), ValidationSnafu { param });
    Ok(())
}

/// Fail with [HalError::Validation] when a required input is absent.
pub fn require_some<'a, T>(param: &str, value: Option<&'a T>) -> Result<&'a T, HalError> {
    value.ok_or_else(|| HalError::Validation {
        param: param.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use snafu::ResultExt;

    #[test]
    fn require_rejects_blank_input() {
        assert!(require("relationName", "author").is_ok());
        assert_eq!(
            require("relationName", "  "),
            Err(HalError::Validation {
                param: "relationName".into()
            })
        );
    }

    #[test]
    fn require_some_reports_missing_param() {
        let body: Option<&u32> = None;
        let err = require_some("requestBody", body).unwrap_err();
        assert_eq!(err.to_string(), "required parameter 'requestBody' is null, undefined or empty");
    }

    #[test]
    fn status_codes_follow_variants() {
        let err = HalError::UnsupportedMethod {
            method: "DELETE".into(),
        };
        assert_eq!(err.status(), StatusCode::MethodNotAllowed);
        let err = HalError::Transport {
            status: 404,
            message: "gone".into(),
        };
        assert_eq!(err.status(), StatusCode::NotFound);
        let err = HalError::Transport {
            status: 42,
            message: "bogus".into(),
        };
        assert_eq!(err.status(), StatusCode::InternalServerError);
    }

    #[test]
    fn client_errors_round_trip_through_surf() {
        let original = HalError::RelationNotFound {
            relation: "author".into(),
        };
        let lifted = client_error::<HalError>(original.clone());
        assert_eq!(lifted.status(), StatusCode::NotFound);
        let recovered: Result<(), HalError> = Err(lifted).context(ClientError);
        assert_eq!(recovered, Err(original));
    }

    #[test]
    fn foreign_client_errors_keep_their_status() {
        let foreign = surf::Error::from_str(StatusCode::Conflict, "version mismatch");
        let recovered: Result<(), HalError> = Err(foreign).context(ClientError);
        assert_eq!(
            recovered,
            Err(HalError::Transport {
                status: 409,
                message: "version mismatch".into()
            })
        );
    }
}
