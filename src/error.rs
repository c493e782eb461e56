// Copyright (c) "bolt-core" contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::io;

use log::info;
use thiserror::Error;

use crate::bolt::BoltMeta;
use crate::value::ValueReceive;

/// Errors that can occur while driving a Bolt connection.
///
/// **Important notes on usage:**
///  * Error messages are *not* considered part of the crate's API.
///    They may change at any time and don't follow semantic versioning.
///  * The only string in errors that can be (somewhat<sup>1</sup>) reliably used is
///    [`ServerError::code()`].
///
/// <sup>1</sup>The code is received from the server and therefore might still change depending on
/// the server version.
#[derive(Error, Debug)]
pub enum BoltError {
    /// Used when
    ///  * experiencing a connectivity error.
    ///    E.g., a broken channel or a handshake that cannot complete.
    #[error("connection failed: {message}{}",
            source.as_ref().map(|err| format!(" caused by: {err}")).unwrap_or_default())]
    #[non_exhaustive]
    Disconnect {
        message: String,
        source: Option<io::Error>,
    },

    /// Used when the caller requests something the connection cannot do.
    /// For example:
    ///  * a feature that is not supported by the negotiated protocol version
    ///    (transaction configuration, impersonation, notification filters, …),
    ///  * a value that cannot be represented on the wire
    ///    (e.g., a collection with more than [`i64::MAX`] entries, a leap second).
    #[error("invalid configuration: {message}")]
    #[non_exhaustive]
    InvalidConfig { message: String },

    /// Used when the server answers a request with FAILURE.
    #[error("{error}")]
    #[non_exhaustive]
    ServerError { error: Box<ServerError> },

    /// Used when connection acquisition from the pool timed out.
    #[error("{message}")]
    #[non_exhaustive]
    Timeout { message: String },

    /// If you encounter this error, there's either a bug in this crate or the server.
    /// An unexpected message or message content was received from the server.
    #[error(
        "the driver encountered a protocol violation, \
        this is likely a bug in the driver or the server: {message}"
    )]
    #[non_exhaustive]
    ProtocolError { message: String },
}

impl BoltError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BoltError::ServerError { error } => error.is_retryable(),
            BoltError::Disconnect { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn read_err(err: io::Error) -> Self {
        info!("read error: {err}");
        Self::Disconnect {
            message: String::from("failed to read"),
            source: Some(err),
        }
    }

    pub(crate) fn wrap_read<T>(res: io::Result<T>) -> Result<T> {
        match res {
            Ok(t) => Ok(t),
            Err(err) => Err(Self::read_err(err)),
        }
    }

    pub(crate) fn write_error(err: io::Error) -> BoltError {
        info!("write error: {err}");
        Self::Disconnect {
            message: String::from("failed to write"),
            source: Some(err),
        }
    }

    pub(crate) fn wrap_write<T>(res: io::Result<T>) -> Result<T> {
        match res {
            Ok(t) => Ok(t),
            Err(err) => Err(Self::write_error(err)),
        }
    }

    pub(crate) fn connect_error(err: io::Error) -> BoltError {
        Self::Disconnect {
            message: String::from("failed to open connection"),
            source: Some(err),
        }
    }

    pub(crate) fn wrap_connect<T>(res: io::Result<T>) -> Result<T> {
        match res {
            Ok(t) => Ok(t),
            Err(err) => Err(Self::connect_error(err)),
        }
    }

    pub(crate) fn disconnect<S: Into<String>>(message: S) -> Self {
        Self::Disconnect {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn protocol_error<S: Into<String>>(message: S) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn connection_acquisition_timeout<S: AsRef<str>>(during: S) -> Self {
        Self::Timeout {
            message: format!("connection acquisition timed out while {}", during.as_ref()),
        }
    }
}

const UNKNOWN_NEO4J_CODE: &str = "Neo.DatabaseError.General.UnknownError";
const UNKNOWN_NEO4J_MESSAGE: &str = "An unknown error occurred.";
const UNKNOWN_GQL_STATUS: &str = "50N42";
const UNKNOWN_GQL_STATUS_DESCRIPTION: &str =
    "error: general processing exception - unexpected error";
// starts with UNKNOWN_GQL_STATUS
const UNKNOWN_GQL_MESSAGE: &str =
    "50N42: Unexpected error has occurred. See debug log for details.";

/// A FAILURE received from the server.
#[derive(Debug)]
#[non_exhaustive]
pub struct ServerError {
    pub code: String,
    pub message: String,
    pub gql_status: String,
    pub gql_status_description: String,
    pub gql_raw_classification: Option<String>,
    pub gql_classification: GqlErrorClassification,
    pub diagnostic_record: HashMap<String, ValueReceive>,
    pub cause: Option<Box<GqlErrorCause>>,
}

impl ServerError {
    fn map_legacy_codes(code: String) -> String {
        match code.as_str() {
            // In 5.0, these errors have been re-classified as ClientError.
            // For backwards compatibility with Neo4j 4.4 and earlier, they are
            // re-mapped on the client side, too.
            "Neo.TransientError.Transaction.Terminated" => {
                String::from("Neo.ClientError.Transaction.Terminated")
            }
            "Neo.TransientError.Transaction.LockClientStopped" => {
                String::from("Neo.ClientError.Transaction.LockClientStopped")
            }
            _ => code,
        }
    }

    /// Parse a FAILURE metadata dictionary as sent by servers before GQL
    /// error support (Bolt < 5.7).
    pub(crate) fn from_meta(mut meta: BoltMeta) -> Self {
        let code = match meta.remove("code") {
            Some(ValueReceive::String(code)) => code,
            _ => UNKNOWN_NEO4J_CODE.into(),
        };
        let message = match meta.remove("message") {
            Some(ValueReceive::String(message)) => message,
            _ => UNKNOWN_NEO4J_MESSAGE.into(),
        };
        let gql_status_description = format!("{UNKNOWN_GQL_STATUS_DESCRIPTION}. {message}");
        Self {
            code: Self::map_legacy_codes(code),
            message,
            gql_status: String::from(UNKNOWN_GQL_STATUS),
            gql_status_description,
            gql_raw_classification: None,
            gql_classification: GqlErrorClassification::Unknown,
            diagnostic_record: GqlErrorCause::default_diagnostic_record(),
            cause: None,
        }
    }

    /// Parse a FAILURE metadata dictionary carrying GQL error data
    /// (Bolt >= 5.7); `neo4j_code` is copied into [`ServerError::code`].
    pub(crate) fn from_meta_gql(mut meta: BoltMeta) -> Self {
        let code = match meta.remove("neo4j_code") {
            Some(ValueReceive::String(code)) => code,
            _ => UNKNOWN_NEO4J_CODE.into(),
        };

        let gql_data = GqlErrorCause::from_meta(meta);

        Self {
            code: Self::map_legacy_codes(code),
            message: gql_data.message,
            gql_status: gql_data.gql_status,
            gql_status_description: gql_data.gql_status_description,
            gql_raw_classification: gql_data.gql_raw_classification,
            gql_classification: gql_data.gql_classification,
            diagnostic_record: gql_data.diagnostic_record,
            cause: gql_data.cause,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn classification(&self) -> &str {
        self.code.split('.').nth(1).unwrap_or("")
    }

    pub fn category(&self) -> &str {
        self.code.split('.').nth(2).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.code.split('.').nth(3).unwrap_or("")
    }

    pub(crate) fn is_retryable(&self) -> bool {
        match self.code() {
            "Neo.ClientError.Security.AuthorizationExpired"
            | "Neo.ClientError.Cluster.NotALeader"
            | "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase" => true,
            _ => self.classification() == "TransientError",
        }
    }

    pub(crate) fn clone_error(&self) -> Self {
        Self {
            code: self.code.clone(),
            message: self.message.clone(),
            gql_status: self.gql_status.clone(),
            gql_status_description: self.gql_status_description.clone(),
            gql_raw_classification: self.gql_raw_classification.clone(),
            gql_classification: self.gql_classification,
            diagnostic_record: self.diagnostic_record.clone(),
            cause: self.cause.clone(),
        }
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "server error: {} (code: {}, gql_status: {})",
            self.message, self.code, self.gql_status,
        )?;
        if let Some(cause) = &self.cause {
            write!(f, "\ncaused by: {cause}")?;
        }
        Ok(())
    }
}

impl From<ServerError> for BoltError {
    fn from(error: ServerError) -> Self {
        BoltError::ServerError {
            error: Box::new(error),
        }
    }
}

/// See [`ServerError::gql_classification`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GqlErrorClassification {
    ClientError,
    DatabaseError,
    TransientError,
    /// Used when the server provides a classification this crate is unaware of.
    /// This can happen when connecting to a newer server or before GQL errors
    /// were introduced.
    Unknown,
}

impl GqlErrorClassification {
    fn from_str(s: &str) -> Self {
        match s {
            "CLIENT_ERROR" => Self::ClientError,
            "DATABASE_ERROR" => Self::DatabaseError,
            "TRANSIENT_ERROR" => Self::TransientError,
            _ => Self::Unknown,
        }
    }
}

/// Nested cause of a GQL-aware [`ServerError`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct GqlErrorCause {
    pub gql_status: String,
    pub message: String,
    pub gql_status_description: String,
    pub gql_raw_classification: Option<String>,
    pub gql_classification: GqlErrorClassification,
    pub diagnostic_record: HashMap<String, ValueReceive>,
    pub cause: Option<Box<GqlErrorCause>>,
}

impl GqlErrorCause {
    pub(crate) fn from_meta(mut meta: BoltMeta) -> Self {
        let mut message = meta
            .remove("message")
            .and_then(|v| v.try_into_string().ok());
        let mut gql_status = meta
            .remove("gql_status")
            .and_then(|v| v.try_into_string().ok());
        let mut description = meta
            .remove("description")
            .and_then(|v| v.try_into_string().ok());
        let diagnostic_record = meta
            .remove("diagnostic_record")
            .and_then(|v| v.try_into_map().ok())
            .unwrap_or_else(Self::default_diagnostic_record);
        let cause = meta
            .remove("cause")
            .and_then(|v| v.try_into_map().ok())
            .map(GqlErrorCause::from_meta)
            .map(Box::new);
        let gql_raw_classification = diagnostic_record
            .get("_classification")
            .and_then(ValueReceive::as_string)
            .cloned();
        let gql_classification = gql_raw_classification
            .as_deref()
            .map(GqlErrorClassification::from_str)
            .unwrap_or(GqlErrorClassification::Unknown);

        if gql_status.is_none() || message.is_none() || description.is_none() {
            gql_status = Some(String::from(UNKNOWN_GQL_STATUS));
            message = Some(String::from(UNKNOWN_GQL_MESSAGE));
            description = Some(String::from(UNKNOWN_GQL_STATUS_DESCRIPTION));
        }
        let gql_status = gql_status.expect("cannot be None because of code above");
        let message = message.expect("cannot be None because of code above");
        let description = description.expect("cannot be None because of code above");

        Self {
            message,
            gql_status,
            gql_status_description: description,
            gql_raw_classification,
            gql_classification,
            diagnostic_record,
            cause,
        }
    }

    pub(crate) fn default_diagnostic_record() -> HashMap<String, ValueReceive> {
        let mut map = HashMap::with_capacity(3);
        map.insert(
            String::from("OPERATION"),
            ValueReceive::String(String::from("")),
        );
        map.insert(
            String::from("OPERATION_CODE"),
            ValueReceive::String(String::from("0")),
        );
        map.insert(
            String::from("CURRENT_SCHEMA"),
            ValueReceive::String(String::from("/")),
        );
        map
    }
}

impl Display for GqlErrorCause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, "\ncaused by: {cause}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, BoltError>;

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    fn meta_with_code(code: &str) -> BoltMeta {
        let mut meta = HashMap::new();
        meta.insert(
            String::from("code"),
            ValueReceive::String(String::from(code)),
        );
        meta.insert(
            String::from("message"),
            ValueReceive::String(String::from("something went wrong")),
        );
        meta
    }

    #[rstest]
    #[case(
        "Neo.TransientError.Transaction.Terminated",
        "Neo.ClientError.Transaction.Terminated"
    )]
    #[case(
        "Neo.TransientError.Transaction.LockClientStopped",
        "Neo.ClientError.Transaction.LockClientStopped"
    )]
    #[case(
        "Neo.TransientError.General.DatabaseUnavailable",
        "Neo.TransientError.General.DatabaseUnavailable"
    )]
    fn test_legacy_code_mapping(#[case] sent: &str, #[case] expected: &str) {
        let error = ServerError::from_meta(meta_with_code(sent));
        assert_eq!(error.code(), expected);
    }

    #[test]
    fn test_unparsable_failure_meta_yields_unknown_error() {
        let error = ServerError::from_meta(HashMap::new());
        assert_eq!(error.code(), UNKNOWN_NEO4J_CODE);
        assert_eq!(error.message(), UNKNOWN_NEO4J_MESSAGE);
        assert_eq!(error.gql_status, UNKNOWN_GQL_STATUS);
    }

    #[test]
    fn test_code_segments() {
        let error = ServerError::from_meta(meta_with_code("Neo.ClientError.Statement.SyntaxError"));
        assert_eq!(error.classification(), "ClientError");
        assert_eq!(error.category(), "Statement");
        assert_eq!(error.title(), "SyntaxError");
    }

    #[test]
    fn test_gql_meta_copies_neo4j_code() {
        let mut meta = HashMap::new();
        meta.insert(
            String::from("neo4j_code"),
            ValueReceive::String(String::from("Neo.ClientError.Statement.SyntaxError")),
        );
        meta.insert(
            String::from("gql_status"),
            ValueReceive::String(String::from("42001")),
        );
        meta.insert(
            String::from("message"),
            ValueReceive::String(String::from("bad syntax")),
        );
        meta.insert(
            String::from("description"),
            ValueReceive::String(String::from("error: syntax error")),
        );
        let error = ServerError::from_meta_gql(meta);
        assert_eq!(error.code(), "Neo.ClientError.Statement.SyntaxError");
        assert_eq!(error.gql_status, "42001");
        assert_eq!(error.message(), "bad syntax");
    }

    #[test]
    fn test_default_diagnostic_record() {
        let record = GqlErrorCause::default_diagnostic_record();
        assert_eq!(
            record.get("OPERATION"),
            Some(&ValueReceive::String(String::new()))
        );
        assert_eq!(
            record.get("OPERATION_CODE"),
            Some(&ValueReceive::String(String::from("0")))
        );
        assert_eq!(
            record.get("CURRENT_SCHEMA"),
            Some(&ValueReceive::String(String::from("/")))
        );
    }
}
