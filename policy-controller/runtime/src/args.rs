use crate::{admission::Admission, core::integrity::Rules, metrics::AdmissionMetrics, verify};
use anyhow::{bail, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use tokio::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "terranetes-policy-controller",
    about = "Governs terraform configurations"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "terranetes=info,warn",
        env = "TERRANETES_POLICY_CONTROLLER_LOG",
        global = true
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain", global = true)]
    log_format: kubert::LogFormat,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Serve the validating admission webhook.
    Admission(AdmissionArgs),

    /// Verify a configuration against security policies and contexts.
    Verify(verify::Args),
}

#[derive(Debug, clap::Args)]
struct AdmissionArgs {
    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Disables the admission controller server.
    #[clap(long)]
    admission_controller_disabled: bool,

    /// Refuse to delete namespaces that still hold configurations.
    #[clap(long, env = "TERRANETES_ENABLE_NAMESPACE_PROTECTION")]
    enable_namespace_protection: bool,

    /// Bounds each list call made while reviewing a request.
    #[clap(long, default_value = "5000")]
    list_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            command,
        } = self;

        match command {
            Command::Admission(args) => args.run(log_level, log_format).await,
            Command::Verify(args) => {
                log_format
                    .try_init(log_level)
                    .expect("must configure logging");
                let report = args.run()?;
                if report.is_failed() {
                    bail!("{} check(s) failed", report.failed_count());
                }
                Ok(())
            }
        }
    }
}

impl AdmissionArgs {
    async fn run(self, log_level: kubert::LogFilter, log_format: kubert::LogFormat) -> Result<()> {
        let Self {
            client,
            server,
            admin,
            admission_controller_disabled,
            enable_namespace_protection,
            list_timeout_ms,
        } = self;

        let server = if admission_controller_disabled {
            None
        } else {
            Some(server)
        };

        let mut prom = <Registry>::default();
        let metrics = AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_optional_server(server)
            .build()
            .await?;

        let rules = Rules {
            namespace_protection: enable_namespace_protection,
        };
        let timeout = Duration::from_millis(list_timeout_ms);
        info!(?rules, ?timeout, "Starting admission controller");

        let client = runtime.client();
        let runtime = runtime
            .spawn_server(move || Admission::new(client.clone(), rules, timeout, metrics.clone()));

        // Block the main thread on the shutdown signal.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
