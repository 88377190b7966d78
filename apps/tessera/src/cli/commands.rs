//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::Config;
use serde_json::{Value, json};
use std::io::Write;
use std::path::{Path, PathBuf};
use tessera_core::{
    Actor, ApprovalId, ApprovalStatus, EventType, ObjectId, Record, ReviewDecision, Role,
    TesseraError, Vault, canonicalize, export_record, import_frame,
    primitives::{MAX_FRAME_LENGTH, MAX_OBJECT_SIZE},
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a record JSON file for `export` (16 MB).
const MAX_RECORD_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), TesseraError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| TesseraError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(TesseraError::Schema(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
///
/// Canonicalizing resolves `..` and symlinks before anything is read.
fn validate_file_path(path: &Path) -> Result<PathBuf, TesseraError> {
    let canonical = path.canonicalize().map_err(|e| {
        TesseraError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(TesseraError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path whose parent directory must already exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, TesseraError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        TesseraError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(TesseraError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| TesseraError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Validate, size-check and read an input file.
fn read_input(path: &Path, max_size: u64) -> Result<Vec<u8>, TesseraError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, max_size)?;
    std::fs::read(&validated).map_err(|e| TesseraError::Io(format!("Read file: {}", e)))
}

/// Read an input file that must be UTF-8 text.
fn read_input_text(path: &Path, max_size: u64) -> Result<String, TesseraError> {
    String::from_utf8(read_input(path, max_size)?)
        .map_err(|_| TesseraError::Schema(format!("'{}' is not UTF-8", path.display())))
}

/// Write to `output`, or to stdout when none is given.
fn write_output(output: Option<&Path>, bytes: &[u8]) -> Result<(), TesseraError> {
    match output {
        Some(path) => {
            let validated = validate_output_path(path)?;
            std::fs::write(&validated, bytes)
                .map_err(|e| TesseraError::Io(format!("Write file: {}", e)))?;
            tracing::info!(path = %validated.display(), bytes = bytes.len(), "written");
            Ok(())
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(bytes)
                .and_then(|()| stdout.flush())
                .map_err(|e| TesseraError::Io(format!("Write stdout: {}", e)))
        }
    }
}

fn print_json(output: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(output).unwrap_or_default()
    );
}

/// Open the vault at `db_path`, creating it if needed.
pub fn open_vault(db_path: &Path) -> Result<Vault, TesseraError> {
    tracing::debug!(path = %db_path.display(), "opening vault");
    Vault::open(db_path)
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new vault.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), TesseraError> {
    if db_path.exists() {
        if !force {
            return Err(TesseraError::Schema(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| TesseraError::Io(format!("Remove existing database: {}", e)))?;
        tracing::warn!(path = %db_path.display(), "existing vault removed");
    }

    let _vault = open_vault(db_path)?;
    println!("Initialized new vault at {:?}", db_path);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show vault status.
pub fn cmd_status(db_path: &Path, json_mode: bool) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let stats = vault.stats()?;
    let ledger = vault.ledger();

    let mut chains = Vec::new();
    for org in ledger.orgs()? {
        let head = ledger.head(&org)?;
        chains.push((org, head));
    }

    if json_mode {
        let output = json!({
            "database": db_path.to_string_lossy(),
            "stats": stats,
            "chains": chains
                .iter()
                .map(|(org, head)| json!({ "org_id": org, "head": head }))
                .collect::<Vec<_>>(),
        });
        print_json(&output);
        return Ok(());
    }

    println!("Tessera Vault Status");
    println!("====================");
    println!("Database: {:?}", db_path);
    println!();
    println!("Objects:         {}", stats.objects);
    println!("Tombstones:      {}", stats.tombstones);
    println!("Audit Events:    {}", stats.audit_events);
    println!("Audit Chains:    {}", stats.audit_chains);
    println!("Tool Policies:   {}", stats.tool_policies);
    println!("Tool Approvals:  {}", stats.tool_approvals);
    println!("Model Policies:  {}", stats.model_policies);

    if !chains.is_empty() {
        println!();
        println!("Chain Heads:");
        for (org, head) in &chains {
            match head {
                Some(h) => println!("  {:<20} seq {:<8} {}", org, h.seq, h.event_hash),
                None => println!("  {:<20} (empty)", org),
            }
        }
    }

    Ok(())
}

// =============================================================================
// OBJECT COMMANDS
// =============================================================================

/// Store a file's bytes as an object.
pub fn cmd_put(db_path: &Path, json_mode: bool, file: &Path) -> Result<(), TesseraError> {
    let bytes = read_input(file, MAX_OBJECT_SIZE as u64)?;
    let vault = open_vault(db_path)?;
    let id = vault.objects().put(&bytes)?;

    if json_mode {
        print_json(&json!({ "id": id, "size": bytes.len() }));
    } else {
        println!("{}", id);
    }
    Ok(())
}

/// Write an object's bytes to a file or stdout.
pub fn cmd_get(
    db_path: &Path,
    id: &str,
    output: Option<&Path>,
    verify: bool,
) -> Result<(), TesseraError> {
    let id = ObjectId::parse(id)?;
    let vault = open_vault(db_path)?;
    let store = vault.objects();
    let bytes = if verify {
        store.get_verified(&id)?
    } else {
        store.get(&id)?
    };
    write_output(output, &bytes)
}

/// Check an object against its id. A mismatch is returned as an error.
pub fn cmd_verify(db_path: &Path, json_mode: bool, id: &str) -> Result<(), TesseraError> {
    let id = ObjectId::parse(id)?;
    let vault = open_vault(db_path)?;
    vault.objects().check(&id)?;

    if json_mode {
        print_json(&json!({ "id": id, "intact": true }));
    } else {
        println!("{} intact", id);
    }
    Ok(())
}

/// Delete an object, leaving a tombstone.
pub fn cmd_rm(db_path: &Path, json_mode: bool, id: &str) -> Result<(), TesseraError> {
    let id = ObjectId::parse(id)?;
    let vault = open_vault(db_path)?;
    let store = vault.objects();
    let removed = store.delete(&id)?;
    let tombstoned_at = store.tombstone(&id)?;

    if json_mode {
        print_json(&json!({
            "id": id,
            "removed": removed,
            "tombstoned_at": tombstoned_at,
        }));
    } else if removed {
        println!("Removed {}", id);
    } else {
        println!("{} was not present", id);
    }
    Ok(())
}

/// List stored objects.
pub fn cmd_objects(db_path: &Path, json_mode: bool) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let objects = vault.objects().list()?;

    if json_mode {
        print_json(&json!({ "objects": objects }));
        return Ok(());
    }

    println!("{:<64}  {:>12}  {:>15}", "ID", "SIZE", "CREATED_AT");
    for meta in &objects {
        println!(
            "{:<64}  {:>12}  {:>15}",
            meta.id,
            meta.size,
            meta.created_at.as_millis()
        );
    }
    println!();
    println!("{} objects", objects.len());
    Ok(())
}

// =============================================================================
// CODEC COMMANDS
// =============================================================================

/// Encode a record JSON file as a canonical frame.
pub fn cmd_export(input: &Path, output: Option<&Path>) -> Result<(), TesseraError> {
    let data = read_input(input, MAX_RECORD_FILE_SIZE)?;
    let record: Record = serde_json::from_slice(&data)
        .map_err(|e| TesseraError::Schema(format!("Invalid record JSON: {}", e)))?;
    let frame = export_record(&record)?;
    tracing::debug!(frame_type = %record.frame_type(), "record exported");
    write_output(output, frame.as_bytes())
}

/// Decode a frame file into record JSON.
pub fn cmd_import(input: &Path, output: Option<&Path>) -> Result<(), TesseraError> {
    let text = read_input_text(input, MAX_FRAME_LENGTH as u64)?;
    let record = import_frame(text.trim_end())?;
    let mut pretty = serde_json::to_string_pretty(&record)?;
    pretty.push('\n');
    write_output(output, pretty.as_bytes())
}

/// Print the canonical form of a frame file.
pub fn cmd_canonicalize(input: &Path) -> Result<(), TesseraError> {
    let text = read_input_text(input, MAX_FRAME_LENGTH as u64)?;
    let canonical = canonicalize(text.trim_end())?;
    println!("{}", canonical.as_str());
    Ok(())
}

// =============================================================================
// LEDGER COMMANDS
// =============================================================================

/// Append one event to an org's chain.
pub fn cmd_append(
    db_path: &Path,
    json_mode: bool,
    org: &str,
    event_type: EventType,
    actor: &str,
    payload: &str,
    run_id: Option<&str>,
) -> Result<(), TesseraError> {
    let payload: Value = serde_json::from_str(payload)
        .map_err(|e| TesseraError::Schema(format!("Payload is not JSON: {}", e)))?;
    let vault = open_vault(db_path)?;
    let event = vault
        .ledger()
        .append(org, event_type, &Actor::new(actor), payload, run_id)?;

    if json_mode {
        print_json(&json!(event));
    } else {
        println!("Appended {} to '{}' at seq {}", event.id, org, event.seq);
        println!("  hash: {}", event.event_hash);
    }
    Ok(())
}

/// List an org's events in chain order.
pub fn cmd_events(db_path: &Path, json_mode: bool, org: &str) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let events = vault.ledger().events(org)?;

    if json_mode {
        print_json(&json!({ "org_id": org, "events": events }));
        return Ok(());
    }

    println!("Audit chain '{}' ({} events)", org, events.len());
    println!("==========================");
    for event in &events {
        println!(
            "{:>6}  {:<9} {:<16} {:>15}  {}",
            event.seq,
            event.event_type,
            event.actor,
            event.timestamp.as_millis(),
            &event.event_hash[..16.min(event.event_hash.len())]
        );
    }
    Ok(())
}

/// Recompute one chain, or every chain when `org` is `None`.
pub fn cmd_verify_chain(
    db_path: &Path,
    json_mode: bool,
    org: Option<&str>,
) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let ledger = vault.ledger();
    let orgs = match org {
        Some(o) => vec![o.to_string()],
        None => ledger.orgs()?,
    };

    let mut reports = Vec::with_capacity(orgs.len());
    for org in &orgs {
        reports.push(ledger.verify_chain(org)?);
    }

    if json_mode {
        print_json(&json!({ "verified": true, "chains": reports }));
        return Ok(());
    }

    for report in &reports {
        println!(
            "{:<20} OK  {} events  head {}",
            report.org_id, report.events, report.head
        );
    }
    if reports.is_empty() {
        println!("No audit chains");
    }
    Ok(())
}

// =============================================================================
// POLICY COMMANDS
// =============================================================================

/// Write the config file's policies into the vault.
pub fn cmd_policy_load(
    db_path: &Path,
    json_mode: bool,
    config: &Config,
    actor: &str,
) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let report = config.seed(&vault, &Actor::new(actor))?;

    if json_mode {
        print_json(&json!({
            "tool_policies": report.tool_policies,
            "model_policies": report.model_policies,
        }));
    } else {
        println!(
            "Loaded {} tool policies and {} model policies",
            report.tool_policies, report.model_policies
        );
    }
    Ok(())
}

/// List the policies stored for an org.
pub fn cmd_policy_list(db_path: &Path, json_mode: bool, org: &str) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let tools = vault.tools().policies(org)?;
    let models = vault.models().policies(org)?;

    if json_mode {
        print_json(&json!({
            "org_id": org,
            "tool_policies": tools,
            "model_policies": models,
        }));
        return Ok(());
    }

    println!("Tool policies ({})", tools.len());
    for p in &tools {
        let roles: Vec<&str> = p.allowed_roles.iter().map(Role::as_str).collect();
        println!(
            "  {:<24} {:<8} roles [{}]",
            p.tool_name,
            p.mode,
            roles.join(",")
        );
    }
    println!();
    println!("Model policies ({})", models.len());
    for p in &models {
        println!(
            "  {}/{}  rpm {:?}  tpm {:?}  per-request {:?}  daily {:?}",
            p.provider, p.model_name, p.max_rpm, p.max_tpm, p.max_cost_per_request, p.max_daily_cost
        );
    }
    Ok(())
}

// =============================================================================
// APPROVAL COMMANDS
// =============================================================================

/// List an org's tool approvals.
pub fn cmd_approvals(
    db_path: &Path,
    json_mode: bool,
    org: &str,
    status: Option<ApprovalStatus>,
) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let approvals = vault.tools().approvals(org, status)?;

    if json_mode {
        print_json(&json!({ "org_id": org, "approvals": approvals }));
        return Ok(());
    }

    println!("{:>6}  {:<20} {:<9} {:<16}", "ID", "TOOL", "STATUS", "REQUESTED_BY");
    for a in &approvals {
        println!(
            "{:>6}  {:<20} {:<9} {:<16}",
            a.id.0, a.tool_name, a.status, a.requested_by
        );
    }
    Ok(())
}

/// Approve or deny a pending approval.
pub fn cmd_review(
    db_path: &Path,
    json_mode: bool,
    id: u64,
    reviewer: &str,
    roles: &[String],
    decision: ReviewDecision,
) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let roles: Vec<Role> = roles.iter().map(Role::new).collect();
    let approval = vault
        .tools()
        .review(ApprovalId(id), &Actor::new(reviewer), &roles, decision)?;

    if json_mode {
        print_json(&json!(approval));
    } else {
        println!("Approval {} is now {}", approval.id, approval.status);
    }
    Ok(())
}

// =============================================================================
// MODEL USAGE COMMAND
// =============================================================================

/// Show a model's current window, daily spend and cooldown.
pub fn cmd_usage(
    db_path: &Path,
    json_mode: bool,
    org: &str,
    provider: &str,
    model: &str,
) -> Result<(), TesseraError> {
    let vault = open_vault(db_path)?;
    let usage = vault.models().usage(org, provider, model)?;

    if json_mode {
        print_json(&json!({
            "org_id": org,
            "provider": provider,
            "model_name": model,
            "usage": usage,
        }));
        return Ok(());
    }

    println!("Usage of {}/{} in '{}'", provider, model, org);
    println!("  Requests (60s): {}", usage.requests_in_window);
    println!("  Tokens (60s):   {}", usage.tokens_in_window);
    println!("  Cost today:     {} micro-units", usage.cost_today);
    println!("  Pending:        {}", usage.pending);
    println!("  Failures:       {}", usage.failures);
    match usage.cooldown_until {
        Some(until) => println!("  Cooldown until: {}", until.as_millis()),
        None => println!("  Cooldown:       none"),
    }
    Ok(())
}

// =============================================================================
// COMPACT COMMAND
// =============================================================================

/// Compact the vault file.
pub fn cmd_compact(db_path: &Path) -> Result<(), TesseraError> {
    let mut vault = open_vault(db_path)?;
    let compacted = vault.compact()?;
    if compacted {
        println!("Compacted {:?}", db_path);
    } else {
        println!("Nothing to compact");
    }
    Ok(())
}
