//! Offline verification of a configuration against a set of policies and
//! contexts, as a CI gate.

use crate::{
    core::{modules, resolve, ComplianceReport, Error as PolicyError},
    k8s::{Configuration, Context, Namespace, ObjectMeta, Policy, ResourceExt},
    render::Format,
};
use anyhow::{bail, Context as _, Result};
use serde::{de::DeserializeOwned, Deserialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MODULE_SOURCE: &str = "Module Source";
pub const SECURITY_POLICY: &str = "Security Policy";
pub const CONTEXTS: &str = "Contexts";
pub const DEFAULT_VARIABLES: &str = "Default Variables";
pub const PROVIDER: &str = "Provider";

/// Verify a configuration against security policies and contexts.
#[derive(Debug, clap::Args)]
pub struct Args {
    /// Path to a YAML file holding the configuration to verify.
    #[clap(long, short = 'c')]
    configuration: PathBuf,

    /// Paths to YAML files holding policies. May be repeated.
    #[clap(long = "policy", short = 'p')]
    policies: Vec<PathBuf>,

    /// Paths to YAML files holding contexts. May be repeated.
    #[clap(long = "context")]
    contexts: Vec<PathBuf>,

    /// Path to a YAML file holding the configuration's namespace.
    ///
    /// When omitted, the namespace is assumed to carry no labels.
    #[clap(long, short = 'n')]
    namespace: Option<PathBuf>,

    #[clap(long, short = 'o', default_value = "plain")]
    output: Format,
}

/// The objects a verification run is evaluated over.
#[derive(Clone, Debug)]
pub struct Inputs {
    pub configuration: Configuration,
    pub namespace: Namespace,
    pub policies: Vec<Policy>,
    pub contexts: Vec<Context>,
}

/// The subset of an object's type metadata used to sort YAML documents.
#[derive(Debug, Deserialize)]
struct Kind {
    #[serde(default)]
    kind: String,
}

// === impl Args ===

impl Args {
    /// Loads the inputs, runs the checks and prints the report.
    ///
    /// Returns the report so the caller can apply the gate.
    pub fn run(self) -> Result<ComplianceReport> {
        let Self {
            configuration,
            policies,
            contexts,
            namespace,
            output,
        } = self;

        let inputs = Inputs::load(&configuration, &policies, &contexts, namespace.as_deref())?;
        let report = verify(&inputs)?;

        let stdout = std::io::stdout();
        output.render(&report, &mut stdout.lock())?;
        Ok(report)
    }
}

// === impl Inputs ===

impl Inputs {
    pub fn load(
        configuration: &Path,
        policies: &[PathBuf],
        contexts: &[PathBuf],
        namespace: Option<&Path>,
    ) -> Result<Self> {
        let configuration = match load_kind::<Configuration>(configuration)?.as_slice() {
            [config] => config.clone(),
            [] => bail!("{} holds no Configuration", configuration.display()),
            _ => bail!("{} holds more than one Configuration", configuration.display()),
        };

        let namespace = match namespace {
            Some(path) => load_kind::<Namespace>(path)?
                .into_iter()
                .find(|ns| Some(ns.name_any()) == configuration.namespace())
                .with_context(|| {
                    format!(
                        "{} holds no Namespace named {}",
                        path.display(),
                        configuration.namespace().unwrap_or_default()
                    )
                })?,
            None => Namespace {
                metadata: ObjectMeta {
                    name: configuration.namespace(),
                    ..Default::default()
                },
                ..Default::default()
            },
        };

        let mut inputs = Self {
            configuration,
            namespace,
            policies: Vec::new(),
            contexts: Vec::new(),
        };
        for path in policies {
            inputs.policies.extend(load_kind::<Policy>(path)?);
        }
        for path in contexts {
            inputs.contexts.extend(load_kind::<Context>(path)?);
        }

        info!(
            configuration = %inputs.configuration.name_any(),
            policies = inputs.policies.len(),
            contexts = inputs.contexts.len(),
            "Loaded inputs"
        );
        Ok(inputs)
    }
}

/// Loads every document of kind `T` from a multi-document YAML file. Documents
/// of other kinds are ignored.
fn load_kind<T>(path: &Path) -> Result<Vec<T>>
where
    T: kube::Resource<DynamicType = ()> + DeserializeOwned,
{
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_kind(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_kind<T>(data: &str) -> Result<Vec<T>>
where
    T: kube::Resource<DynamicType = ()> + DeserializeOwned,
{
    let want = T::kind(&());
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(data) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }

        let Kind { kind } = serde_yaml::from_value(value.clone())?;
        if kind != want {
            debug!(%kind, "Skipping document");
            continue;
        }
        objects.push(serde_yaml::from_value(value)?);
    }
    Ok(objects)
}

/// Runs every check over `inputs`.
///
/// Failed checks are recorded in the report. An error is returned only when a
/// check cannot be evaluated, e.g. because a policy holds a malformed selector
/// or pattern.
pub fn verify(inputs: &Inputs) -> Result<ComplianceReport, PolicyError> {
    let Inputs {
        configuration,
        namespace,
        policies,
        contexts,
    } = inputs;
    let mut report = ComplianceReport::new();

    report.check(MODULE_SOURCE, |rec| {
        let module = configuration.spec.module.as_str();
        match modules::is_permitted(module, policies)? {
            modules::Decision::Local => rec.passed(format_args!("{module} is a local module")),
            modules::Decision::Unconstrained => {
                rec.passed("no policies constrain module sources")
            }
            modules::Decision::Permitted { policy } => {
                rec.passed(format_args!("{module} is permitted by policy {policy}"))
            }
            modules::Decision::Denied { checked } => {
                rec.failed(format_args!("{module} is not permitted by any policy"));
                for policy in checked {
                    rec.additional(format_args!("checked policy {policy}"));
                }
            }
        }
        Ok::<_, PolicyError>(())
    })?;

    report.check(SECURITY_POLICY, |rec| {
        match resolve::resolve_policy(configuration, namespace, policies) {
            Ok(Some(policy)) => {
                rec.passed(format_args!("security policy {} applies", policy.name_any()))
            }
            Ok(None) => rec.warning("no security policy applies"),
            Err(error @ PolicyError::AmbiguousPolicy { .. }) => rec.failed(error),
            Err(error) => return Err(error),
        }
        Ok(())
    })?;

    report.check(CONTEXTS, |rec| {
        let sources = configuration.spec.value_from.iter().flatten();
        let mut referenced = false;
        for source in sources {
            let Some(name) = source.context.as_deref() else {
                continue;
            };
            referenced = true;

            let optional = source.optional.unwrap_or(false);
            let context = contexts.iter().find(|c| c.name_any() == name);
            match context {
                Some(ctx) if ctx.spec.variables.contains_key(&source.key) => {
                    rec.passed(format_args!("context {name} provides {}", source.key))
                }
                Some(_) if optional => rec.warning(format_args!(
                    "context {name} does not provide optional variable {}",
                    source.key
                )),
                Some(_) => rec.failed(format_args!(
                    "context {name} does not provide variable {}",
                    source.key
                )),
                None if optional => rec.warning(format_args!("optional context {name} not found")),
                None => rec.failed(format_args!("context {name} not found")),
            }
        }
        if !referenced {
            rec.skipped("no contexts referenced");
        }
        Ok::<_, PolicyError>(())
    })?;

    report.check(DEFAULT_VARIABLES, |rec| {
        let mut applied = false;
        for name in configuration.default_policies() {
            applied = true;
            if policies.iter().any(|p| p.name_any() == name) {
                rec.passed(format_args!("default variables from policy {name}"));
            } else {
                rec.warning(format_args!(
                    "default variables reference unknown policy {name}"
                ));
            }
        }
        if !applied {
            rec.skipped("no default variables applied");
        }
        Ok::<_, PolicyError>(())
    })?;

    report.check(PROVIDER, |rec| {
        match configuration.spec.provider_ref.as_ref() {
            Some(provider) => rec.info(format_args!("uses provider {}", provider.name)),
            None => rec.warning("no provider referenced, the default provider will be used"),
        }
        Ok::<_, PolicyError>(())
    })?;

    debug!(
        passed = report.passed_count(),
        failed = report.failed_count(),
        warning = report.warning_count(),
        "Verification complete"
    );
    Ok(report)
}
