//! Core slice: authentication, current theme and the three global alerts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Action, Reducer, SliceState};

/// Reserved store key of the core slice, and prefix of every core action type.
pub const CORE_PACKAGE_ID: &str = "__CORE_PACKAGE";

pub const CORE_INITIALIZE: &str = "__CORE_PACKAGE_INITIALIZE";
pub const CORE_SET_CURRENT_USER: &str = "__CORE_PACKAGE_SET_CURRENT_USER";
pub const CORE_SET_THEME: &str = "__CORE_PACKAGE_SET_THEME";
pub const CORE_SET_ERROR: &str = "__CORE_PACKAGE_SET_ERROR";
pub const CORE_SET_WAIT: &str = "__CORE_PACKAGE_SET_WAIT";
pub const CORE_SET_MSG: &str = "__CORE_PACKAGE_SET_MSG";
pub const CORE_CLEAR_ALERT: &str = "__CORE_PACKAGE_CLEAR_ALERT";

pub const DEFAULT_THEME_ID: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeType {
    #[default]
    Light,
    Dark,
}

impl ThemeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemeType::Light => "light",
            ThemeType::Dark => "dark",
        }
    }
}

impl std::fmt::Display for ThemeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ThemeType {
    type Err = crate::ArkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(ThemeType::Light),
            "dark" => Ok(ThemeType::Dark),
            other => Err(crate::ArkError::InvalidThemeType {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub can_close_manually: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreState {
    pub is_authenticated: bool,
    pub token: Option<String>,
    pub user_info: serde_json::Value,
    pub current_theme_id: String,
    pub current_theme_type: ThemeType,
    pub is_theme_changing: bool,
    pub error_alert: AlertRecord,
    pub wait_alert: AlertRecord,
    pub message_alert: AlertRecord,
    #[serde(default)]
    pub has_initialized: bool,
    /// Context fields without a dedicated slot.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for CoreState {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            token: None,
            user_info: serde_json::Value::Null,
            current_theme_id: DEFAULT_THEME_ID.to_string(),
            current_theme_type: ThemeType::Light,
            is_theme_changing: false,
            error_alert: AlertRecord::default(),
            wait_alert: AlertRecord::default(),
            message_alert: AlertRecord::default(),
            has_initialized: false,
            extra: serde_json::Map::new(),
        }
    }
}

/// Payload of `SET_CURRENT_USER`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub is_authenticated: bool,
    #[serde(default)]
    pub user_info: serde_json::Value,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetThemePayload {
    current_theme_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_theme_type: Option<ThemeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    is_theme_changing: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlertPayload {
    value: AlertRecord,
}

/// Which of the three alert records an alert action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Error,
    Wait,
    Message,
}

impl AlertKind {
    fn action_type(self) -> &'static str {
        match self {
            AlertKind::Error => CORE_SET_ERROR,
            AlertKind::Wait => CORE_SET_WAIT,
            AlertKind::Message => CORE_SET_MSG,
        }
    }
}

/// Typed constructors for the core action vocabulary.
pub struct CoreAction;

impl CoreAction {
    pub fn initialize(payload: serde_json::Value) -> Action {
        Action::new(CORE_INITIALIZE, payload)
    }

    pub fn set_current_user(user: CurrentUser) -> Action {
        Action::new(
            CORE_SET_CURRENT_USER,
            serde_json::to_value(user).unwrap_or_default(),
        )
    }

    pub fn set_theme(id: &str, kind: Option<ThemeType>, changing: Option<bool>) -> Action {
        let payload = SetThemePayload {
            current_theme_id: id.to_string(),
            current_theme_type: kind,
            is_theme_changing: changing,
        };
        Action::new(
            CORE_SET_THEME,
            serde_json::to_value(payload).unwrap_or_default(),
        )
    }

    pub fn set_alert(kind: AlertKind, value: AlertRecord) -> Action {
        Action::new(
            kind.action_type(),
            serde_json::to_value(AlertPayload { value }).unwrap_or_default(),
        )
    }

    pub fn clear_alert() -> Action {
        Action::bare(CORE_CLEAR_ALERT)
    }
}

fn parse<T: serde::de::DeserializeOwned>(action: &Action) -> Option<T> {
    match serde_json::from_value(action.payload.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(action = %action.kind, error = %e, "malformed core action payload; ignored");
            None
        }
    }
}

/// Pure transition function of the core slice. `None` means "unchanged".
pub fn reduce_core(state: &CoreState, action: &Action) -> Option<CoreState> {
    match action.kind.as_str() {
        CORE_INITIALIZE => {
            let serde_json::Value::Object(context) = &action.payload else {
                tracing::warn!("context payload is not a JSON object; ignored");
                return None;
            };
            let mut merged = match serde_json::to_value(state) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => return None,
            };
            for (k, v) in context {
                merged.insert(k.clone(), v.clone());
            }
            merged.insert("hasInitialized".into(), serde_json::Value::Bool(true));
            match serde_json::from_value::<CoreState>(serde_json::Value::Object(merged)) {
                Ok(next) => Some(next),
                Err(e) => {
                    tracing::warn!(error = %e, "context payload conflicts with core state; ignored");
                    None
                }
            }
        }
        CORE_SET_CURRENT_USER => {
            let user: CurrentUser = parse(action)?;
            Some(CoreState {
                is_authenticated: user.is_authenticated,
                user_info: user.user_info,
                token: user.token,
                ..state.clone()
            })
        }
        CORE_SET_THEME => {
            let p: SetThemePayload = parse(action)?;
            Some(CoreState {
                current_theme_id: p.current_theme_id,
                current_theme_type: p.current_theme_type.unwrap_or(ThemeType::Light),
                is_theme_changing: p.is_theme_changing.unwrap_or(false),
                ..state.clone()
            })
        }
        CORE_SET_ERROR | CORE_SET_WAIT | CORE_SET_MSG => {
            let AlertPayload { value } = parse(action)?;
            let mut next = state.clone();
            match action.kind.as_str() {
                CORE_SET_ERROR => next.error_alert = value,
                CORE_SET_WAIT => next.wait_alert = value,
                _ => next.message_alert = value,
            }
            Some(next)
        }
        CORE_CLEAR_ALERT => {
            let mut next = state.clone();
            next.error_alert.is_open = false;
            next.wait_alert.is_open = false;
            next.message_alert.is_open = false;
            Some(next)
        }
        _ => None,
    }
}

/// The built-in reducer registered under [`CORE_PACKAGE_ID`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreReducer;

impl Reducer for CoreReducer {
    fn initial_state(&self) -> SliceState {
        Arc::new(CoreState::default())
    }

    fn reduce(&self, state: &SliceState, action: &Action) -> SliceState {
        if !action.kind.starts_with(CORE_PACKAGE_ID) {
            return state.clone();
        }
        match state.downcast_ref::<CoreState>() {
            Some(core) => match reduce_core(core, action) {
                Some(next) => Arc::new(next),
                None => state.clone(),
            },
            None => state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(msg: &str) -> AlertRecord {
        AlertRecord {
            is_open: true,
            title: Some("Title".into()),
            message: Some(msg.into()),
            can_close_manually: true,
        }
    }

    #[test]
    fn initial_state_is_default_light_theme() {
        let s = CoreState::default();
        assert_eq!(s.current_theme_id, "default");
        assert_eq!(s.current_theme_type, ThemeType::Light);
        assert!(!s.is_theme_changing);
        assert!(!s.is_authenticated);
    }

    #[test]
    fn set_current_user_overwrites_auth_fields() {
        let next = reduce_core(
            &CoreState::default(),
            &CoreAction::set_current_user(CurrentUser {
                is_authenticated: true,
                user_info: json!({"name": "ada"}),
                token: Some("t0k".into()),
            }),
        )
        .unwrap();
        assert!(next.is_authenticated);
        assert_eq!(next.user_info["name"], "ada");
        assert_eq!(next.token.as_deref(), Some("t0k"));
    }

    #[test]
    fn set_theme_defaults_type_and_changing_flag() {
        let state = CoreState {
            current_theme_type: ThemeType::Dark,
            is_theme_changing: true,
            ..CoreState::default()
        };
        let next = reduce_core(&state, &CoreAction::set_theme("paper", None, None)).unwrap();
        assert_eq!(next.current_theme_id, "paper");
        assert_eq!(next.current_theme_type, ThemeType::Light);
        assert!(!next.is_theme_changing);

        let next = reduce_core(
            &state,
            &CoreAction::set_theme("dark1", Some(ThemeType::Dark), Some(true)),
        )
        .unwrap();
        assert_eq!(next.current_theme_type, ThemeType::Dark);
        assert!(next.is_theme_changing);
    }

    #[test]
    fn set_theme_payload_uses_camel_case() {
        let action = CoreAction::set_theme("dark1", Some(ThemeType::Dark), Some(false));
        assert_eq!(action.kind, "__CORE_PACKAGE_SET_THEME");
        assert_eq!(
            action.payload,
            json!({"currentThemeId": "dark1", "currentThemeType": "dark", "isThemeChanging": false})
        );
    }

    #[test]
    fn alerts_are_replaced_wholesale() {
        let state = CoreState {
            wait_alert: alert("old"),
            ..CoreState::default()
        };
        let next = reduce_core(
            &state,
            &CoreAction::set_alert(
                AlertKind::Wait,
                AlertRecord {
                    is_open: true,
                    ..AlertRecord::default()
                },
            ),
        )
        .unwrap();
        assert!(next.wait_alert.is_open);
        assert_eq!(next.wait_alert.message, None);
        assert_eq!(next.error_alert, AlertRecord::default());
    }

    #[test]
    fn clear_alert_closes_all_but_keeps_content() {
        let state = CoreState {
            error_alert: alert("boom"),
            wait_alert: alert("hold on"),
            message_alert: alert("hi"),
            ..CoreState::default()
        };
        let next = reduce_core(&state, &CoreAction::clear_alert()).unwrap();
        for record in [&next.error_alert, &next.wait_alert, &next.message_alert] {
            assert!(!record.is_open);
            assert!(record.can_close_manually);
        }
        assert_eq!(next.error_alert.message.as_deref(), Some("boom"));
        assert_eq!(next.message_alert.message.as_deref(), Some("hi"));
    }

    #[test]
    fn unknown_action_leaves_state_untouched() {
        let state = CoreState {
            current_theme_id: "dark1".into(),
            error_alert: alert("x"),
            ..CoreState::default()
        };
        assert!(reduce_core(&state, &Action::bare("__CORE_PACKAGE_NOPE")).is_none());
        assert!(reduce_core(&state, &Action::bare("notes-ADD")).is_none());

        let reducer = CoreReducer;
        let slice: SliceState = Arc::new(state);
        let after = reducer.reduce(&slice, &Action::bare("notes-ADD"));
        assert!(Arc::ptr_eq(&slice, &after));
    }

    #[test]
    fn malformed_payload_is_ignored() {
        let action = Action::new(CORE_SET_THEME, json!({"isThemeChanging": true}));
        assert!(reduce_core(&CoreState::default(), &action).is_none());
    }

    #[test]
    fn initialize_merges_context_payload() {
        let next = reduce_core(
            &CoreState::default(),
            &CoreAction::initialize(json!({"isAuthenticated": true, "tenant": "acme"})),
        )
        .unwrap();
        assert!(next.has_initialized);
        assert!(next.is_authenticated);
        assert_eq!(next.extra["tenant"], "acme");
        assert_eq!(next.current_theme_id, "default");
    }

    #[test]
    fn theme_type_parsing() {
        assert_eq!("dark".parse::<ThemeType>().unwrap(), ThemeType::Dark);
        assert!("sepia".parse::<ThemeType>().is_err());
    }
}
