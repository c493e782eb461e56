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
use std::io::{Read, Write};
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;

use super::message_parameters::{PullParameters, RouteParameters, RunParameters};
use super::packstream::{
    PackStreamSerializer, PackStreamSerializerDebugImpl, PackStreamSerializerImpl,
};
use super::{BoltData, BoltProtocol, ResponseCallbacks};
use crate::config::NotificationFilter;
use crate::error::{BoltError, Result};
use crate::value::{BrokenValueInner, ValueReceive, ValueSend};

pub(super) const BOLT_AGENT_PRODUCT: &str = env!("BOLT_AGENT_PRODUCT");
pub(super) const BOLT_AGENT_PLATFORM: &str = env!("BOLT_AGENT_PLATFORM");
pub(super) const BOLT_AGENT_LANGUAGE: &str = env!("BOLT_AGENT_LANGUAGE");
pub(super) const BOLT_AGENT_LANGUAGE_DETAILS: &str = env!("BOLT_AGENT_LANGUAGE_DETAILS");

pub(super) const TAG_2D_POINT: u8 = b'X';
pub(super) const TAG_3D_POINT: u8 = b'Y';
pub(super) const TAG_NODE: u8 = b'N';
pub(super) const TAG_RELATIONSHIP: u8 = b'R';
pub(super) const TAG_UNBOUND_RELATIONSHIP: u8 = b'r';
pub(super) const TAG_PATH: u8 = b'P';
pub(super) const TAG_DATE: u8 = b'D';
pub(super) const TAG_TIME: u8 = b'T';
pub(super) const TAG_LOCAL_TIME: u8 = b't';
pub(super) const TAG_DATE_TIME: u8 = b'I';
pub(super) const TAG_LEGACY_DATE_TIME: u8 = b'F';
pub(super) const TAG_DATE_TIME_ZONE_ID: u8 = b'i';
pub(super) const TAG_LEGACY_DATE_TIME_ZONE_ID: u8 = b'f';
pub(super) const TAG_LOCAL_DATE_TIME: u8 = b'd';
pub(super) const TAG_DURATION: u8 = b'E';

macro_rules! value_as {
    ($variant:ident, $value:expr, $name:literal, $type_name:literal $($format_arg:tt)*) => {
        match $value {
            ValueReceive::$variant(i) => i,
            v => {
                return invalid_struct(format!(
                    concat!(
                        "expected ",
                        $name,
                        " to be ",
                        $type_name,
                        ", found {0:?}"
                    ),
                    v
                    $($format_arg)*
                ));
            }
        }
    };
}

macro_rules! as_int {
    ($value:expr, $name:literal $($format_arg:tt)*) => {
        value_as!(Integer, $value, $name, "integer" $($format_arg)*)
    };
}

macro_rules! as_float {
    ($value:expr, $name:literal $($format_arg:tt)*) => {
        value_as!(Float, $value, $name, "float" $($format_arg)*)
    };
}

macro_rules! as_string {
    ($value:expr, $name:literal $($format_arg:tt)*) => {
        value_as!(String, $value, $name, "string" $($format_arg)*)
    };
}

macro_rules! as_map {
    ($value:expr, $name:literal $($format_arg:tt)*) => {
        value_as!(Map, $value, $name, "map" $($format_arg)*)
    };
}

macro_rules! as_vec {
    ($value:expr, $name:literal $($format_arg:tt)*) => {
        value_as!(List, $value, $name, "list" $($format_arg)*)
    };
}

macro_rules! as_node {
    ($value:expr, $name:literal $($format_arg:tt)*) => {
        value_as!(Node, $value, $name, "Node" $($format_arg)*)
    };
}

#[inline]
pub(super) fn invalid_struct(reason: impl Into<String>) -> ValueReceive {
    let reason = reason.into();
    ValueReceive::BrokenValue(BrokenValueInner::InvalidStruct { reason }.into())
}

#[inline]
pub(super) fn failed_struct(reason: impl Into<String>) -> ValueReceive {
    ValueReceive::BrokenValue(BrokenValueInner::Reason(reason.into()).into())
}

/// Servers speaking Bolt >= 3 report query timings as `t_first`/`t_last`;
/// those keys are renamed to the stable metadata names.
pub(super) fn rewrite_timing_meta(meta: &mut super::BoltMeta) {
    if let Some(t_first) = meta.remove("t_first") {
        meta.insert(String::from("result_available_after"), t_first);
    }
    if let Some(t_last) = meta.remove("t_last") {
        meta.insert(String::from("result_consumed_after"), t_last);
    }
}

// [bolt-version-bump] search tag when changing bolt version support
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(super) enum ServerAwareBoltVersion {
    V1x0,
    V2x0,
    V3x0,
    V4x0,
    V4x1,
    V4x2,
    V4x3,
    V4x4,
    V5x0,
    V5x1,
    V5x2,
    V5x3,
    V5x4,
    V5x5,
    V5x6,
    V5x7,
}

impl ServerAwareBoltVersion {
    pub(super) fn from_negotiated(version: (u8, u8)) -> Self {
        match version {
            (1, 0) => Self::V1x0,
            (2, 0) => Self::V2x0,
            (3, 0) => Self::V3x0,
            (4, 0) => Self::V4x0,
            (4, 1) => Self::V4x1,
            (4, 2) => Self::V4x2,
            (4, 3) => Self::V4x3,
            (4, 4) => Self::V4x4,
            (5, 0) => Self::V5x0,
            (5, 1) => Self::V5x1,
            (5, 2) => Self::V5x2,
            (5, 3) => Self::V5x3,
            (5, 4) => Self::V5x4,
            (5, 5) => Self::V5x5,
            (5, 6) => Self::V5x6,
            (5, 7) => Self::V5x7,
            _ => panic!("negotiated unimplemented protocol version {version:?}"),
        }
    }

    #[inline]
    fn protocol_version(&self) -> &'static str {
        match self {
            Self::V1x0 => "1.0",
            Self::V2x0 => "2.0",
            Self::V3x0 => "3.0",
            Self::V4x0 => "4.0",
            Self::V4x1 => "4.1",
            Self::V4x2 => "4.2",
            Self::V4x3 => "4.3",
            Self::V4x4 => "4.4",
            Self::V5x0 => "5.0",
            Self::V5x1 => "5.1",
            Self::V5x2 => "5.2",
            Self::V5x3 => "5.3",
            Self::V5x4 => "5.4",
            Self::V5x5 => "5.5",
            Self::V5x6 => "5.6",
            Self::V5x7 => "5.7",
        }
    }

    #[inline]
    fn min_server_version(&self) -> &'static str {
        match self {
            Self::V1x0 => "3.0",
            Self::V2x0 => "3.4",
            Self::V3x0 => "3.5",
            Self::V4x0 => "4.0",
            Self::V4x1 => "4.1",
            Self::V4x2 => "4.2",
            Self::V4x3 => "4.3",
            Self::V4x4 => "4.4",
            Self::V5x0 => "5.0",
            Self::V5x1 => "5.5",
            Self::V5x2 => "5.7",
            Self::V5x3 => "5.9",
            Self::V5x4 => "5.13",
            Self::V5x5 => "5.21",
            Self::V5x6 => "5.23",
            Self::V5x7 => "5.26",
        }
    }
}

/// A RECORD carrying a known structure tag with the wrong shape terminates
/// the connection.
#[inline]
pub(super) fn invalid_record_error(reason: &str) -> BoltError {
    BoltError::protocol_error(format!("RECORD contained invalid structure: {reason}"))
}

pub(super) fn check_no_notification_filter(
    version: ServerAwareBoltVersion,
    filter: Option<&NotificationFilter>,
) -> Result<()> {
    match filter {
        None => Ok(()),
        Some(filter) if filter.is_default() => Ok(()),
        Some(_) => Err(unsupported_protocol_feature_error(
            "notification filtering",
            version,
            ServerAwareBoltVersion::V5x2,
        )),
    }
}

pub(super) fn write_notification_filter_entry(
    mut log_buf: Option<&mut String>,
    serializer: &mut PackStreamSerializerImpl<impl Write>,
    dbg_serializer: &mut PackStreamSerializerDebugImpl,
    filter: &NotificationFilter,
) -> Result<()> {
    serializer.write_string("notifications")?;
    serializer.write_dict_header(filter.entry_count())?;
    super::debug_buf!(log_buf, "{}", {
        dbg_serializer.write_string("notifications").unwrap();
        dbg_serializer.write_dict_header(filter.entry_count()).unwrap();
        dbg_serializer.flush()
    });
    if let Some(severity) = &filter.minimum_severity {
        serializer.write_string("minimum_severity")?;
        serializer.write_string(severity)?;
        super::debug_buf!(log_buf, "{}", {
            dbg_serializer.write_string("minimum_severity").unwrap();
            dbg_serializer.write_string(severity).unwrap();
            dbg_serializer.flush()
        });
    }
    if let Some(categories) = &filter.disabled_categories {
        serializer.write_string("disabled_categories")?;
        serializer.write_list_header(categories.len() as u64)?;
        for category in categories {
            serializer.write_string(category)?;
        }
        super::debug_buf!(log_buf, "{}", {
            dbg_serializer.write_string("disabled_categories").unwrap();
            dbg_serializer
                .write_list_header(categories.len() as u64)
                .unwrap();
            for category in categories {
                dbg_serializer.write_string(category).unwrap();
            }
            dbg_serializer.flush()
        });
    }
    Ok(())
}

/// Fetch the routing table through the routing procedure (no ROUTE message
/// before Bolt 4.3): a RUN + PULL pair whose single RECORD is re-shaped into
/// the `rt` metadata the ROUTE message would have produced.
pub(super) fn route_via_procedure<P: BoltProtocol, RW: Read + Write>(
    protocol: &mut P,
    data: &mut BoltData<RW>,
    parameters: RouteParameters,
    callbacks: ResponseCallbacks,
    procedure_call: &str,
    system_db: bool,
) -> Result<()> {
    let RouteParameters {
        routing_context,
        bookmarks,
        db,
        imp_user: _,
    } = parameters;

    let mut params: HashMap<String, ValueSend> = HashMap::with_capacity(2);
    params.insert(
        String::from("context"),
        ValueSend::Map(
            routing_context
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
    );
    if system_db {
        params.insert(
            String::from("database"),
            db.map(|db| ValueSend::String(db.into()))
                .unwrap_or(ValueSend::Null),
        );
    }

    let shared_callbacks = Arc::new(AtomicRefCell::new(Some(callbacks)));
    let keys: Arc<AtomicRefCell<Vec<String>>> = Default::default();
    let records: Arc<AtomicRefCell<Vec<Vec<ValueReceive>>>> = Default::default();

    let run_callbacks = {
        let keys = Arc::clone(&keys);
        ResponseCallbacks::new()
            .with_on_success(move |mut meta| {
                if let Some(ValueReceive::List(fields)) = meta.remove("fields") {
                    *keys.borrow_mut() = fields
                        .into_iter()
                        .filter_map(|field| field.try_into_string().ok())
                        .collect();
                }
                Ok(())
            })
            .with_on_failure({
                let shared_callbacks = Arc::clone(&shared_callbacks);
                move |error| match shared_callbacks.borrow_mut().take() {
                    Some(mut callbacks) => callbacks.on_failure(error),
                    None => Err(error),
                }
            })
    };
    let run_params = RunParameters::<String, String>::new_auto_commit_run(
        procedure_call,
        Some(&params),
        bookmarks,
        None,
        None,
        Some("r"),
        system_db.then_some("system"),
        None,
        None,
    );
    protocol.run(data, run_params, run_callbacks)?;

    let pull_callbacks = {
        let record_sink = Arc::clone(&records);
        ResponseCallbacks::new()
            .with_on_record(move |fields| {
                record_sink.borrow_mut().push(fields);
                Ok(())
            })
            .with_on_success({
                let shared_callbacks = Arc::clone(&shared_callbacks);
                move |_| {
                    let mut records = records.borrow_mut();
                    if records.len() != 1 {
                        return Err(BoltError::protocol_error(format!(
                            "expected exactly 1 record from the routing procedure, found {}",
                            records.len()
                        )));
                    }
                    let record = records.pop().expect("checked length above");
                    let keys = keys.borrow();
                    if keys.len() != record.len() {
                        return Err(BoltError::protocol_error(format!(
                            "routing procedure record had {} entries but {} keys were announced",
                            record.len(),
                            keys.len()
                        )));
                    }
                    let table: HashMap<String, ValueReceive> =
                        keys.iter().cloned().zip(record).collect();
                    let mut meta = HashMap::with_capacity(1);
                    meta.insert(String::from("rt"), ValueReceive::Map(table));
                    match shared_callbacks.borrow_mut().take() {
                        Some(mut callbacks) => callbacks.on_success(ValueReceive::Map(meta)),
                        None => Ok(()),
                    }
                }
            })
            .with_on_failure(move |error| match shared_callbacks.borrow_mut().take() {
                Some(mut callbacks) => callbacks.on_failure(error),
                None => Err(error),
            })
    };
    protocol.pull(data, PullParameters::new(-1, -1), pull_callbacks)
}

/// Capability gate: the caller asked for something this protocol version
/// cannot express. Raised before any bytes are buffered.
#[inline]
pub(super) fn unsupported_protocol_feature_error(
    name: &str,
    current_version: ServerAwareBoltVersion,
    needed_version: ServerAwareBoltVersion,
) -> BoltError {
    BoltError::InvalidConfig {
        message: format!(
            "{name} is not supported via bolt version {}, requires at least server version {}",
            current_version.protocol_version(),
            needed_version.min_server_version(),
        ),
    }
}
