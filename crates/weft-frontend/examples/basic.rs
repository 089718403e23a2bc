//! Basic Weft Example
//!
//! Compiles a few local edits against an in-memory document and prints the
//! ops each one would send to the merge engine, along with its patch.
//!
//! Run with: cargo run --example basic

use anyhow::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use weft_core::{Change, Context, ObjectCache, ObjectDiff, ObjectId, PathElement, Value};
use weft_frontend::{Backend, BackendError, Frontend, FrontendConfig, LocalChange, Patch, Request};

const CONFIG: &str = r#"
actor = "demo"

[context]
table-literals = "populate"
"#;

/// Records requests and acknowledges them without a patch of its own
#[derive(Default)]
struct Journal {
    requests: Vec<Request>,
}

impl Backend for Journal {
    fn apply_local_change(&mut self, request: &Request) -> Result<Patch, BackendError> {
        self.requests.push(request.clone());
        Ok(Patch::empty().answering(request.actor.clone(), request.seq))
    }

    fn get_patch(&self) -> Result<Patch, BackendError> {
        Ok(Patch::empty())
    }

    fn save(&self) -> Result<Vec<u8>, BackendError> {
        serde_json::to_vec(&self.requests).map_err(|e| BackendError::Serialization(e.to_string()))
    }

    fn get_changes(&self) -> Result<Vec<Vec<u8>>, BackendError> {
        self.requests
            .iter()
            .map(|r| r.to_json().map(String::into_bytes))
            .collect()
    }

    fn load(data: &[u8]) -> Result<Self, BackendError> {
        let requests = serde_json::from_slice(data).map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(Self { requests })
    }

    fn load_changes(changes: &[Vec<u8>]) -> Result<Self, BackendError> {
        let requests = changes
            .iter()
            .map(|c| serde_json::from_slice(c).map_err(|e| BackendError::Serialization(e.to_string())))
            .collect::<Result<_, _>>()?;
        Ok(Self { requests })
    }
}

fn main() -> Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    println!("Weft Basic Example\n");

    let config = FrontendConfig::from_toml_str(CONFIG)?;
    let actor = config.actor_id();
    let mut document = ObjectCache::with_root();
    let mut seq = 0;

    println!("=== Local edits ===\n");

    let birds = Value::map([
        ("names", Value::from(vec!["swallow", "magpie"])),
        ("seen", Value::Counter(0)),
    ]);
    let change = edit(&document, &config, |cx| cx.set_map_key(&[], "birds", birds))?;
    let birds_id = change.ops[0]
        .child
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no object created"))?;
    let names_id = change.ops[1]
        .child
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no list created"))?;
    commit(&mut document, change, &actor, &mut seq)?;

    let names = [
        PathElement::new("birds", birds_id.clone()),
        PathElement::new("names", names_id),
    ];
    let change = edit(&document, &config, |cx| {
        cx.splice(&names, 1, 1, vec![Value::from("wren"), Value::from("robin")])
    })?;
    commit(&mut document, change, &actor, &mut seq)?;

    let birds_path = [PathElement::new("birds", birds_id)];
    let change = edit(&document, &config, |cx| cx.increment(&birds_path, "seen", 3))?;
    commit(&mut document, change, &actor, &mut seq)?;

    // Assigning what is already there sends nothing
    let change = edit(&document, &config, |cx| {
        cx.set_map_key(&birds_path, "seen", Value::Counter(3))
    })?;
    println!("no-op edit produced {} ops", change.ops.len());

    println!("\nDocument: {:?}", document.view().materialize_object(&ObjectId::root())?);

    println!("\n=== Frontend preview ===\n");

    let mut frontend = Frontend::load(Journal::default(), &config)?;
    frontend.apply(LocalChange::SetMapKey {
        path: Vec::new(),
        key: "title".into(),
        value: Value::from("Field notes"),
    })?;
    let restored = Frontend::<Journal>::from_saved(&frontend.save()?, &config)?;
    println!("restored journal holds {} request(s)", restored.backend().requests.len());

    let preview = frontend.preview(LocalChange::SetMapKey {
        path: Vec::new(),
        key: "books".into(),
        value: Value::Table(vec![Value::map([("title", Value::from("Frankenstein"))])]),
    })?;
    for op in &preview.ops {
        println!("  {}", serde_json::to_string(op)?);
    }
    println!("Would become: {:?}", preview.root);

    Ok(())
}

/// Run one transaction, printing the patch it delivers
fn edit<T>(
    document: &ObjectCache,
    config: &FrontendConfig,
    run: impl FnOnce(Context<'_>) -> weft_core::Result<Change<T>>,
) -> Result<Change<T>> {
    let mut observer = |diff: &ObjectDiff, _: &mut ObjectCache| match serde_json::to_string(diff) {
        Ok(json) => println!("patch: {}", json),
        Err(e) => eprintln!("patch not printable: {}", e),
    };
    let context = Context::new(config.actor_id(), document, &mut observer).with_options(config.context);
    Ok(run(context)?)
}

/// Keep the edit locally and print the request it would send
fn commit<T>(
    document: &mut ObjectCache,
    change: Change<T>,
    actor: &weft_core::ActorId,
    seq: &mut u64,
) -> Result<()> {
    *seq += 1;
    let request = Request::new(actor.clone(), *seq, change.ops);
    println!("request: {}\n", request.to_json()?);
    document.absorb(change.updated);
    Ok(())
}
