//! Concrete router device: transport, framer and inventory behind one seam.
//!
//! A [`Router`] owns the authenticated shell for one target. Commands go
//! strictly one at a time — the interactive shell has no multiplexing,
//! and a second command sent before the prior prompt returned would
//! corrupt framing irrecoverably.

use std::future::Future;
use std::time::Duration;

use log::{debug, info};

use crate::error::Result;
use crate::framer::{self, DEFAULT_COMMAND_TIMEOUT};
use crate::locations;
use crate::logging::SessionLog;
use crate::model::{Command, CommandResult};
use crate::platform::Inventory;
use crate::transport::{ShellChannel, SshConfig, SshTransport};

/// Command to establish the slot inventory, issued once per connection.
const PLATFORM_COMMAND: &str = "show platform";

/// Seam the orchestrator drives. Implemented by [`Router`]; tests drive
/// the orchestrator with scripted implementations.
pub trait Device: Send {
    /// The router's name, for log attribution.
    fn name(&self) -> &str;

    /// The session log attached to this device, if any.
    fn session_log(&self) -> Option<&SessionLog>;

    /// Execute one configured command: honoring its delays, timeout,
    /// location fan-out and repetition. Results are returned only when
    /// `collect_results` is set; the session log receives everything
    /// either way.
    fn process_command(
        &mut self,
        command: &Command,
        collect_results: bool,
    ) -> impl Future<Output = Result<Vec<CommandResult>>> + Send;
}

/// An SSH-attached router.
pub struct Router {
    name: String,
    transport: SshTransport,
    shell: ShellChannel,
    inventory: Inventory,
    log: Option<SessionLog>,
}

impl Router {
    /// Dial the router, open the interactive shell, set the terminal up
    /// for unpaged output, and build the slot inventory.
    pub async fn connect(
        name: impl Into<String>,
        config: SshConfig,
        log: Option<SessionLog>,
    ) -> Result<Self> {
        let name = name.into();
        let transport = SshTransport::connect(config).await?;
        let mut shell = transport.open_shell().await?;

        // Wide, unpaged output before anything is parsed.
        framer::send_command(
            &mut shell,
            "terminal width 256",
            DEFAULT_COMMAND_TIMEOUT,
            log.as_ref(),
        )
        .await?;
        framer::send_command(
            &mut shell,
            "terminal length 0",
            DEFAULT_COMMAND_TIMEOUT,
            log.as_ref(),
        )
        .await?;

        let raw = framer::send_command(
            &mut shell,
            PLATFORM_COMMAND,
            DEFAULT_COMMAND_TIMEOUT,
            log.as_ref(),
        )
        .await?;
        let inventory = Inventory::parse(&raw)?;
        info!(
            "router {}: inventory built with {} location(s)",
            name,
            inventory.all_locations().len()
        );

        Ok(Self {
            name,
            transport,
            shell,
            inventory,
            log,
        })
    }

    /// The slot inventory parsed at connection time.
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Disconnect from the router.
    pub async fn close(self) -> Result<()> {
        self.transport.close().await
    }

    async fn send_repeated(
        &mut self,
        line: &str,
        times: u32,
        interval: u64,
        timeout: Duration,
        collect_results: bool,
        results: &mut Vec<CommandResult>,
    ) -> Result<()> {
        let times = times.max(1);
        for attempt in 0..times {
            let raw = framer::send_command(&mut self.shell, line, timeout, self.log.as_ref()).await?;
            if collect_results {
                results.push(CommandResult {
                    cmd: line.to_string(),
                    result: raw,
                });
            }
            if attempt + 1 < times && interval > 0 {
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
        }
        Ok(())
    }
}

impl Device for Router {
    fn name(&self) -> &str {
        &self.name
    }

    fn session_log(&self) -> Option<&SessionLog> {
        self.log.as_ref()
    }

    async fn process_command(
        &mut self,
        command: &Command,
        collect_results: bool,
    ) -> Result<Vec<CommandResult>> {
        if command.wait_before > 0 {
            tokio::time::sleep(Duration::from_secs(command.wait_before)).await;
        }

        let timeout = if command.timeout > 0 {
            Duration::from_secs(command.timeout)
        } else {
            DEFAULT_COMMAND_TIMEOUT
        };

        let lines = locations::resolve(command, &self.inventory)?;
        let mut results = Vec::new();
        for line in &lines {
            if command.debug {
                debug!("router {}: sending {:?}, timeout {:?}", self.name, line, timeout);
            }
            self.send_repeated(
                line,
                command.times,
                command.interval,
                timeout,
                collect_results,
                &mut results,
            )
            .await?;
        }

        if command.wait_after > 0 {
            tokio::time::sleep(Duration::from_secs(command.wait_after)).await;
        }

        Ok(results)
    }
}
