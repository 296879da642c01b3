//! Priority commands applied after a recorded discovery feed

use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use logscope_filter::LiveScopeController;
use logscope_observer::PriorityTransport;
use logscope_types::{InstanceId, PriorityMask};

/// Kind of mask change requested by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityOp {
    Set,
    Add,
    Remove,
}

/// One line of a replay command file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayCommand {
    /// `set|add|remove <instance> <path> <priorities>`
    Priority {
        op: PriorityOp,
        instance_id: InstanceId,
        path: String,
        mask: PriorityMask,
    },

    /// `save [instance]`
    Save { target: Option<InstanceId> },
}

impl FromStr for ReplayCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or_else(|| anyhow!("empty command"))?;

        let op = match verb {
            "set" => PriorityOp::Set,
            "add" => PriorityOp::Add,
            "remove" => PriorityOp::Remove,
            "save" => {
                let target = words
                    .next()
                    .map(|w| w.parse::<InstanceId>())
                    .transpose()
                    .context("Invalid instance id")?;
                return Ok(Self::Save { target });
            }
            other => bail!("Unknown command '{}'", other),
        };

        let (Some(instance), Some(path), Some(priorities)) =
            (words.next(), words.next(), words.next())
        else {
            bail!("Expected '{} <instance> <path> <priorities>'", verb);
        };

        Ok(Self::Priority {
            op,
            instance_id: instance.parse().context("Invalid instance id")?,
            path: path.to_string(),
            mask: priorities.parse()?,
        })
    }
}

impl ReplayCommand {
    /// Apply the command, returning whether the tree changed
    pub fn apply<T: PriorityTransport>(&self, live: &mut LiveScopeController<T>) -> Result<bool> {
        match self {
            Self::Priority {
                op,
                instance_id,
                path,
                mask,
            } => {
                let node = live.model().node_at_path(*instance_id, path)?;
                let changed = match op {
                    PriorityOp::Set => live.set_log_priority(*instance_id, node, *mask)?,
                    PriorityOp::Add => live.add_log_priority(*instance_id, node, *mask)?,
                    PriorityOp::Remove => live.remove_log_priority(*instance_id, node, *mask)?,
                };
                Ok(changed)
            }
            Self::Save { target } => {
                live.save_configuration(*target)?;
                Ok(false)
            }
        }
    }
}

/// Parse a command file, skipping blank lines and `#` comments
pub fn parse_commands(content: &str) -> Result<Vec<ReplayCommand>> {
    content
        .lines()
        .enumerate()
        .map(|(n, line)| (n + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(n, line)| line.parse().with_context(|| format!("line {}", n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use logscope_observer::{ObserverRequest, RecordingTransport};
    use logscope_types::{DiscoveryEvent, InstanceInfo, ScopeInfo};

    #[test]
    fn test_parse_commands() {
        let commands = parse_commands(
            "# tweak\nset 7 Svc::* debug,info\n\nremove 7 Svc::Init dbg\nsave\nsave 7\n",
        )
        .unwrap();

        assert_eq!(commands.len(), 4);
        assert_eq!(
            commands[0],
            ReplayCommand::Priority {
                op: PriorityOp::Set,
                instance_id: 7,
                path: "Svc::*".to_string(),
                mask: PriorityMask::DEBUG | PriorityMask::INFO,
            }
        );
        assert_eq!(commands[2], ReplayCommand::Save { target: None });
        assert_eq!(commands[3], ReplayCommand::Save { target: Some(7) });
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = parse_commands("set 7 Svc\n").unwrap_err();
        assert!(format!("{:#}", err).contains("line 1"));
        assert!("mute 7 Svc debug".parse::<ReplayCommand>().is_err());
        assert!("set x Svc debug".parse::<ReplayCommand>().is_err());
        assert!("set 7 Svc loud".parse::<ReplayCommand>().is_err());
    }

    #[test]
    fn test_apply_commands() {
        let mut live = LiveScopeController::new(RecordingTransport::new());
        live.handle_event(DiscoveryEvent::InstancesConnected {
            instances: vec![InstanceInfo::new(7, "app")],
        })
        .unwrap();
        live.handle_event(DiscoveryEvent::ScopesRegistered {
            instance_id: 7,
            scopes: vec![ScopeInfo::new("Svc::Init", 1, PriorityMask::DEBUG)],
        })
        .unwrap();
        live.transport().take();

        for command in parse_commands("add 7 Svc error\nsave 7\n").unwrap() {
            command.apply(&mut live).unwrap();
        }

        let sent = live.transport().take();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], ObserverRequest::PriorityUpdate(_)));
        assert_eq!(sent[1], ObserverRequest::SaveConfig { target: Some(7) });

        let missing: ReplayCommand = "set 7 Nope debug".parse().unwrap();
        assert!(missing.apply(&mut live).is_err());
    }
}
