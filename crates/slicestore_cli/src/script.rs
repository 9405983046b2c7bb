use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::Path as FilePath;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use slicestore::{
    use_get_store, use_reset_store, use_set_store, use_store_at, Binding, GetStore, Path, Provider, ScopedSetter,
    StoreOptions, Tree, Value,
};
use tracing::{info, trace};

/// A scenario: the initial state, the consumers to attach, and the mutations to apply.
#[derive(Debug, Deserialize)]
pub(crate) struct Script {
    #[serde(default)]
    pub(crate) options: StoreOptions,
    pub(crate) initial: Tree,
    /// One consumer is attached per path.
    #[serde(default)]
    pub(crate) watch: Vec<Path>,
    #[serde(default)]
    pub(crate) steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Step {
    /// Scoped write of a value.
    Set { path: Path, value: serde_json::Value },
    /// Scoped write of the integer at `path` plus `by`, absent counts as zero.
    Increment {
        path: Path,
        #[serde(default = "Step::default_increment")]
        by: i64,
    },
    /// Whole-store set, top-level merge.
    Merge(Tree),
    Reset,
}

impl Step {
    fn default_increment() -> i64 {
        1
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Set {
                path, ..
            } => write!(f, "set '{}'", path),
            Step::Increment {
                path,
                by,
            } => write!(f, "increment '{}' by {}", path, by),
            Step::Merge(partial) => {
                let keys: Vec<&str> = partial.keys().map(String::as_str).collect();
                write!(f, "merge {}", keys.join(", "))
            }
            Step::Reset => f.write_str("reset"),
        }
    }
}

impl Script {
    pub(crate) fn load(file: &FilePath) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(file).with_context(|| format!("Reading script. file: {}", file.display()))?;
        Self::parse(&content).with_context(|| format!("Parsing script. file: {}", file.display()))
    }

    pub(crate) fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Runs the script, writing step headers, consumer renders and the final state to `out`.
pub(crate) fn run(script: Script, show_steps: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let provider = Provider::mount_with_options(script.initial, script.options);
    let scope = provider.scope();

    let renders: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let consumers = script
        .watch
        .into_iter()
        .map(|path| {
            let renders = renders.clone();
            let label = path.clone();
            use_store_at(&scope, path, move |value| {
                renders
                    .lock()
                    .push(format!("  render '{}': {}", label, describe(value)));
            })
        })
        .collect::<Result<Vec<Binding>, _>>()?;

    for consumer in &consumers {
        writeln!(out, "watch '{}': {}", consumer.path(), describe(consumer.value().as_ref()))?;
    }

    let get = use_get_store(&scope)?;

    for (index, step) in script.steps.into_iter().enumerate() {
        info!("Running step. index: {}, step: {}", index, step);
        writeln!(out, "step {}: {}", index + 1, step)?;

        match step {
            Step::Set {
                path,
                value,
            } => ScopedSetter::new(provider.store(), path).set(value)?,
            Step::Increment {
                path,
                by,
            } => {
                let next = incremented(&get, &path, by)?;
                ScopedSetter::new(provider.store(), path).set(json!(next))?
            }
            Step::Merge(partial) => use_set_store(&scope)?.set(partial)?,
            Step::Reset => use_reset_store(&scope)?.reset()?,
        }

        for line in renders.lock().drain(..) {
            writeln!(out, "{}", line)?;
        }

        if show_steps {
            writeln!(out, "  state: {}", get.get()?.to_json())?;
        }
    }

    trace!("Detaching consumers. count: {}", consumers.len());
    drop(consumers);

    writeln!(out, "state: {}", get.get()?.to_json())?;

    Ok(())
}

fn incremented(get: &GetStore, path: &Path, by: i64) -> anyhow::Result<i64> {
    let current = match get.get_at(path)? {
        None => 0,
        Some(value) => match value.as_i64() {
            Some(current) => current,
            None => bail!("Value is not an integer. path: '{}', value: {}", path, value.to_json()),
        },
    };

    current
        .checked_add(by)
        .ok_or_else(|| anyhow!("Increment overflows. path: '{}', value: {}, by: {}", path, current, by))
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_json().to_string(),
        None => "absent".to_string(),
    }
}
