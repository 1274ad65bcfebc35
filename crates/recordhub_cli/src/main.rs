//! CLI smoke probe.
//!
//! # Responsibility
//! - Wire `recordhub_core` end to end against an in-memory database.
//! - Print deterministic `key=value` lines for quick sanity checks.
//!
//! Usage: `recordhub [--log-dir <absolute dir>]`

use recordhub_core::{
    default_log_level, init_logging, open_db_in_memory, FieldDef, FieldKind, Identity,
    RecordPermissionPolicy, RecordSchema, RecordService, RecordServiceConfig, RecordType,
    SearchParams,
};
use serde_json::json;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    println!("version={}", recordhub_core::version_info());

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    if let Some(position) = args.iter().position(|arg| arg == "--log-dir") {
        let Some(log_dir) = args.get(position + 1) else {
            eprintln!("error=missing_log_dir");
            return ExitCode::FAILURE;
        };
        if let Err(err) = init_logging(default_log_level(), log_dir) {
            eprintln!("error=logging_init_failed message={err}");
            return ExitCode::FAILURE;
        }
    }

    match smoke() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("event=cli_smoke module=cli status=error error={err}");
            eprintln!("error=smoke_failed message={err}");
            ExitCode::FAILURE
        }
    }
}

fn smoke() -> Result<(), Box<dyn Error>> {
    let conn = open_db_in_memory()?;
    let config = RecordServiceConfig::new(
        RecordType::named("record")?,
        RecordSchema::new().field(FieldDef::new("title", FieldKind::String).required()),
        Arc::new(RecordPermissionPolicy::owner_scoped()),
    );
    let service = RecordService::sqlite(&conn, Arc::new(config));
    let identity = Identity::user("smoke");

    let created = service.create(&identity, &json!({"title": "smoke probe"}), None)?;
    let id = created.id().to_string();
    println!("create status=ok revision={}", created.revision());

    let updated = service.update(&identity, &id, &json!({"title": "smoke probe 2"}), None)?;
    println!("update status=ok revision={}", updated.revision());

    let found = service.search(&identity, &SearchParams::new().with("q", "probe"), None)?;
    println!("search status=ok total={}", found.total());

    service.delete(&identity, &id, None)?;
    let gone = service.read(&identity, &id, None).is_err();
    println!("delete status=ok read_after_delete_fails={gone}");
    Ok(())
}
