//! display-ctl: publish an on/off command to the display bridge
//!
//! Usage:
//!   display-ctl on
//!   display-ctl --topic home/monitors/desk-01 off

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use display_bridge_shared::{defaults, LogicalAction, TopicFilter};
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, QoS};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Send an on/off command to display bridges")]
struct Args {
    /// MQTT broker hostname.
    #[arg(long, env = "DISPLAY_BRIDGE_HOST", default_value = defaults::BROKER_HOST)]
    host: String,

    /// MQTT broker port.
    #[arg(long, env = "DISPLAY_BRIDGE_PORT", default_value_t = defaults::BROKER_PORT)]
    port: u16,

    /// Topic to publish on (default: home/monitors/all).
    #[arg(long)]
    topic: Option<String>,

    /// Give up if the broker does not take the message within this many seconds.
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// `on` or `off`.
    #[arg(value_parser = parse_action)]
    action: LogicalAction,
}

fn parse_action(raw: &str) -> Result<LogicalAction, String> {
    let action = LogicalAction::interpret(raw.as_bytes());
    if action.is_known() {
        Ok(action)
    } else {
        Err(format!("expected `on` or `off`, got {:?}", raw))
    }
}

/// Publish topics must be concrete: no wildcards
fn publish_topic(raw: Option<String>) -> Result<TopicFilter> {
    let topic = match raw {
        Some(raw) => TopicFilter::new(raw)?,
        None => TopicFilter::broadcast(),
    };
    if topic.as_str().contains(['+', '#']) {
        bail!("cannot publish to wildcard topic {}", topic);
    }
    Ok(topic)
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        host,
        port,
        topic,
        timeout,
        action,
    } = Args::parse();

    let topic = publish_topic(topic)?;
    let payload = action
        .as_payload()
        .ok_or_else(|| anyhow!("no payload for {}", action))?;

    let client_id = format!("display-ctl-{}", std::process::id());
    let mut options = MqttOptions::new(client_id, host.clone(), port);
    options.set_keep_alive(Duration::from_secs(defaults::KEEP_ALIVE_SECS));

    let (client, mut eventloop) = AsyncClient::new(options, 10);

    // Requests are queued until the event loop connects
    client
        .publish(topic.as_str(), QoS::AtMostOnce, false, payload.to_vec())
        .await?;
    client.disconnect().await?;

    let drive = async {
        loop {
            match eventloop.poll().await? {
                Event::Outgoing(Outgoing::Publish(_)) => {
                    println!("Sent {} to {}", action, topic);
                }
                Event::Outgoing(Outgoing::Disconnect) => return Ok::<(), anyhow::Error>(()),
                _ => {}
            }
        }
    };

    tokio::time::timeout(Duration::from_secs(timeout), drive)
        .await
        .map_err(|_| anyhow!("timed out talking to {}:{}", host, port))??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("on"), Ok(LogicalAction::TurnOn));
        assert_eq!(parse_action("off"), Ok(LogicalAction::TurnOff));
        assert!(parse_action("ON").is_err());
        assert!(parse_action("toggle").is_err());
    }

    #[test]
    fn test_publish_topic() {
        assert_eq!(publish_topic(None).unwrap(), TopicFilter::broadcast());
        assert_eq!(
            publish_topic(Some("home/monitors/desk-01".into())).unwrap().as_str(),
            "home/monitors/desk-01"
        );
        assert!(publish_topic(Some("home/monitors/+".into())).is_err());
        assert!(publish_topic(Some(String::new())).is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["display-ctl", "--topic", "home/monitors/all", "off"]).unwrap();
        assert_eq!(args.action, LogicalAction::TurnOff);
        assert_eq!(args.port, 1883);

        assert!(Args::try_parse_from(["display-ctl", "toggle"]).is_err());
    }
}
