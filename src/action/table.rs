//! Static per-platform action table

use super::PlatformKey;
use display_bridge_shared::LogicalAction;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by the action table
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("Unsupported platform: {0}")]
    NotSupported(String),

    #[error("Invalid action spec for {platform}: {reason}")]
    InvalidSpec { platform: String, reason: String },
}

/// The on/off command lines for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    /// Program followed by arguments
    pub on_command: Vec<String>,
    pub off_command: Vec<String>,
}

impl ActionSpec {
    pub fn new<S: Into<String>>(
        on_command: impl IntoIterator<Item = S>,
        off_command: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            on_command: on_command.into_iter().map(Into::into).collect(),
            off_command: off_command.into_iter().map(Into::into).collect(),
        }
    }

    /// Command line for a logical action, `None` for unknown payloads
    pub fn command_for(&self, action: &LogicalAction) -> Option<&[String]> {
        match action {
            LogicalAction::TurnOn => Some(&self.on_command),
            LogicalAction::TurnOff => Some(&self.off_command),
            LogicalAction::Unknown(_) => None,
        }
    }

    fn validate(&self, platform: &PlatformKey) -> Result<(), ActionError> {
        let check = |name: &str, command: &[String]| {
            match command.first() {
                Some(program) if !program.is_empty() => Ok(()),
                _ => Err(ActionError::InvalidSpec {
                    platform: platform.to_string(),
                    reason: format!("{} command is empty", name),
                }),
            }
        };
        check("on", &self.on_command)?;
        check("off", &self.off_command)
    }
}

/// Read-only mapping from platform to its action spec
#[derive(Debug, Clone)]
pub struct ActionTable {
    entries: HashMap<PlatformKey, ActionSpec>,
}

impl ActionTable {
    /// The built-in table of display power commands
    pub fn builtin() -> Result<Self, ActionError> {
        Self::from_entries([
            (
                PlatformKey::Darwin,
                ActionSpec::new(["caffeinate", "-u", "-t", "2"], ["pmset", "displaysleepnow"]),
            ),
            (
                PlatformKey::Linux,
                ActionSpec::new(["xset", "dpms", "force", "on"], ["xset", "dpms", "force", "off"]),
            ),
        ])
    }

    /// Build a table from explicit entries, rejecting incomplete specs
    pub fn from_entries(
        entries: impl IntoIterator<Item = (PlatformKey, ActionSpec)>,
    ) -> Result<Self, ActionError> {
        let mut table = HashMap::new();
        for (platform, spec) in entries {
            spec.validate(&platform)?;
            table.insert(platform, spec);
        }
        Ok(Self { entries: table })
    }

    /// Look up the spec for a platform
    pub fn lookup(&self, platform: &PlatformKey) -> Result<&ActionSpec, ActionError> {
        self.entries
            .get(platform)
            .ok_or_else(|| ActionError::NotSupported(platform.to_string()))
    }

    /// Resolve the spec once at startup into an owned value
    pub fn resolve(&self, platform: &PlatformKey) -> Result<ActionSpec, ActionError> {
        self.lookup(platform).cloned()
    }

    #[cfg(test)]
    pub fn platforms(&self) -> impl Iterator<Item = &PlatformKey> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_builtin_specs_are_complete() {
        let table = ActionTable::builtin().unwrap();
        let platforms: Vec<_> = table.platforms().cloned().collect();
        assert_eq!(platforms.len(), 2);

        for platform in platforms {
            let spec = table.lookup(&platform).unwrap();
            assert!(!spec.on_command.is_empty(), "{} on command empty", platform);
            assert!(!spec.off_command.is_empty(), "{} off command empty", platform);
            assert!(spec.validate(&platform).is_ok());
        }
    }

    #[test]
    fn test_linux_commands() {
        let spec = ActionTable::builtin().unwrap().resolve(&PlatformKey::Linux).unwrap();
        assert_eq!(spec.on_command, vec!["xset", "dpms", "force", "on"]);
        assert_eq!(spec.off_command, vec!["xset", "dpms", "force", "off"]);
    }

    #[test]
    fn test_darwin_commands() {
        let spec = ActionTable::builtin().unwrap().resolve(&PlatformKey::Darwin).unwrap();
        assert_eq!(spec.on_command, vec!["caffeinate", "-u", "-t", "2"]);
        assert_eq!(spec.off_command, vec!["pmset", "displaysleepnow"]);
    }

    #[test]
    fn test_unsupported_platform() {
        let table = ActionTable::builtin().unwrap();
        let result = table.lookup(&PlatformKey::Other("windows".into()));
        assert_eq!(result, Err(ActionError::NotSupported("windows".into())));
    }

    #[test]
    fn test_command_for() {
        let spec = ActionTable::builtin().unwrap().resolve(&PlatformKey::Linux).unwrap();
        assert_eq!(
            spec.command_for(&LogicalAction::TurnOn),
            Some(&spec.on_command[..])
        );
        assert_eq!(
            spec.command_for(&LogicalAction::TurnOff),
            Some(&spec.off_command[..])
        );
        assert_eq!(
            spec.command_for(&LogicalAction::Unknown(Bytes::from_static(b"toggle"))),
            None
        );
    }

    #[test]
    fn test_from_entries_rejects_empty_commands() {
        let result = ActionTable::from_entries([(
            PlatformKey::Linux,
            ActionSpec::new(Vec::<String>::new(), vec!["true".to_string()]),
        )]);
        assert!(matches!(result, Err(ActionError::InvalidSpec { .. })));

        let result = ActionTable::from_entries([(
            PlatformKey::Linux,
            ActionSpec::new(["true"], [""]),
        )]);
        assert!(matches!(result, Err(ActionError::InvalidSpec { .. })));
    }

    #[test]
    fn test_invalid_table_is_startup_fatal() {
        let err: crate::error::BridgeError = ActionTable::from_entries([(
            PlatformKey::Darwin,
            ActionSpec::new(["pmset"], Vec::<&str>::new()),
        )])
        .unwrap_err()
        .into();

        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("off command is empty"));
    }

    #[test]
    fn test_from_entries_alternate_table() {
        let table = ActionTable::from_entries([(
            PlatformKey::Other("freebsd".into()),
            ActionSpec::new(["true"], ["true"]),
        )])
        .unwrap();

        assert!(table.lookup(&PlatformKey::Other("freebsd".into())).is_ok());
        assert!(table.lookup(&PlatformKey::Linux).is_err());
    }
}
