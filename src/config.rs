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

use crate::value::ValueSend;

pub use crate::bolt::packstream::IntegerPolicy;

/// Authentication data sent in HELLO (Bolt < 5.1) or LOGON (Bolt >= 5.1).
#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    pub(crate) data: HashMap<String, ValueSend>,
}

impl AuthToken {
    pub fn new_none_auth() -> Self {
        let mut data = HashMap::with_capacity(1);
        data.insert("scheme".into(), "none".into());
        Self { data }
    }

    pub fn new_basic_auth(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut data = HashMap::with_capacity(3);
        data.insert("scheme".into(), "basic".into());
        data.insert("principal".into(), username.into().into());
        data.insert("credentials".into(), password.into().into());
        Self { data }
    }

    pub fn new_bearer_auth(base64_encoded_token: impl Into<String>) -> Self {
        let mut data = HashMap::with_capacity(2);
        data.insert("scheme".into(), "bearer".into());
        data.insert("credentials".into(), base64_encoded_token.into().into());
        Self { data }
    }

    pub fn new_custom_auth(
        principal: Option<String>,
        credentials: Option<String>,
        realm: Option<String>,
        scheme: Option<String>,
        parameters: Option<HashMap<String, ValueSend>>,
    ) -> Self {
        let mut data = HashMap::with_capacity(5);
        if let Some(principal) = principal {
            data.insert("principal".into(), principal.into());
        }
        if let Some(credentials) = credentials {
            data.insert("credentials".into(), credentials.into());
        }
        if let Some(realm) = realm {
            data.insert("realm".into(), realm.into());
        }
        if let Some(scheme) = scheme {
            data.insert("scheme".into(), scheme.into());
        }
        if let Some(parameters) = parameters {
            data.insert("parameters".into(), ValueSend::Map(parameters));
        }
        Self { data }
    }

    pub fn data(&self) -> &HashMap<String, ValueSend> {
        &self.data
    }
}

/// Filter for server notifications, available from Bolt 5.2 onward.
///
/// Emitted as the `notifications` extra entry of HELLO, BEGIN and RUN; the
/// default (no filtering) is not emitted at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFilter {
    pub minimum_severity: Option<String>,
    pub disabled_categories: Option<Vec<String>>,
}

impl NotificationFilter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_minimum_severity(mut self, severity: impl Into<String>) -> Self {
        self.minimum_severity = Some(severity.into());
        self
    }

    pub fn with_disabled_categories(mut self, categories: Vec<String>) -> Self {
        self.disabled_categories = Some(categories);
        self
    }

    pub(crate) fn is_default(&self) -> bool {
        self.minimum_severity.is_none() && self.disabled_categories.is_none()
    }

    pub(crate) fn entry_count(&self) -> u64 {
        u64::from(self.minimum_severity.is_some()) + u64::from(self.disabled_categories.is_some())
    }
}

/// Whether a query may be routed to a read replica.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum RoutingControl {
    Read,
    #[default]
    Write,
}

impl RoutingControl {
    pub(crate) fn as_protocol_str(&self) -> Option<&'static str> {
        match self {
            RoutingControl::Read => Some("r"),
            RoutingControl::Write => None,
        }
    }
}

/// Options applied to auto-commit queries and explicit transactions.
/// Only options with meaningful values are put on the wire.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    pub(crate) bookmarks: Vec<String>,
    pub(crate) tx_timeout: Option<i64>,
    pub(crate) tx_metadata: HashMap<String, ValueSend>,
    pub(crate) mode: RoutingControl,
    pub(crate) db: Option<String>,
    pub(crate) imp_user: Option<String>,
    pub(crate) notification_filter: Option<NotificationFilter>,
}

impl TransactionConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Transaction timeout in milliseconds.
    pub fn with_tx_timeout(mut self, tx_timeout: i64) -> Self {
        self.tx_timeout = Some(tx_timeout);
        self
    }

    pub fn with_tx_metadata(mut self, tx_metadata: HashMap<String, ValueSend>) -> Self {
        self.tx_metadata = tx_metadata;
        self
    }

    pub fn with_mode(mut self, mode: RoutingControl) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.db = Some(db.into());
        self
    }

    pub fn with_impersonated_user(mut self, imp_user: impl Into<String>) -> Self {
        self.imp_user = Some(imp_user.into());
        self
    }

    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.notification_filter = Some(filter);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_shape() {
        let auth = AuthToken::new_basic_auth("neo4j", "pass");
        assert_eq!(auth.data().get("scheme"), Some(&ValueSend::from("basic")));
        assert_eq!(
            auth.data().get("principal"),
            Some(&ValueSend::from("neo4j"))
        );
        assert_eq!(
            auth.data().get("credentials"),
            Some(&ValueSend::from("pass"))
        );
    }

    #[test]
    fn test_default_notification_filter_is_not_emitted() {
        assert!(NotificationFilter::new().is_default());
        assert_eq!(NotificationFilter::new().entry_count(), 0);
    }

    #[test]
    fn test_notification_filter_entries() {
        let filter = NotificationFilter::new()
            .with_minimum_severity("WARNING")
            .with_disabled_categories(vec!["HINT".into()]);
        assert!(!filter.is_default());
        assert_eq!(filter.entry_count(), 2);
    }
}
