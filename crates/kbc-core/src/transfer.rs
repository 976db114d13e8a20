//! Copying a storage bucket table by table.
//!
//! Tables already present at the destination are skipped, so an interrupted
//! run can simply be repeated. Only one exported table is on disk at a time.

use crate::error::{KbcError, Result};
use crate::storage::StorageApi;
use crate::types::{BucketId, Table};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub source_bucket: String,
    pub destination_bucket: String,
    /// True when the destination bucket did not exist and was created.
    pub created_bucket: bool,
    /// Destination ids of the tables copied by this run.
    pub transferred: Vec<String>,
    /// Destination ids that already existed.
    pub skipped: Vec<String>,
}

/// Move `source_table_id` from bucket `source` to bucket `destination`.
pub fn rewrite_table_id(source_table_id: &str, source: &str, destination: &str) -> String {
    match source_table_id.strip_prefix(source).and_then(|r| r.strip_prefix('.')) {
        Some(name) => format!("{destination}.{name}"),
        None => {
            let name = source_table_id.rsplit('.').next().unwrap_or(source_table_id);
            format!("{destination}.{name}")
        }
    }
}

fn table_name(table: &Table) -> &str {
    if !table.name.is_empty() {
        return &table.name;
    }
    table.id.rsplit('.').next().unwrap_or(&table.id)
}

/// Copy every table of `source_bucket` into `destination_bucket` (defaults
/// to the same id). Exports are staged under `workdir`, or the system temp
/// directory when `None`.
pub fn transfer_bucket(
    source: &dyn StorageApi,
    destination: &dyn StorageApi,
    source_bucket: &str,
    destination_bucket: Option<&str>,
    workdir: Option<&Path>,
) -> Result<TransferReport> {
    let src = BucketId::parse(source_bucket)?;
    let dst = BucketId::parse(destination_bucket.unwrap_or(source_bucket))?;
    let src_id = src.to_string();
    let dst_id = dst.to_string();

    let tables = source.list_bucket_tables(&src_id)?;
    tracing::info!(bucket = %src_id, tables = tables.len(), "source bucket listed");

    let mut bucket_exists = destination.list_buckets()?.iter().any(|b| b.id == dst_id);
    let existing: HashSet<String> = if bucket_exists {
        destination
            .list_bucket_tables(&dst_id)?
            .into_iter()
            .map(|t| t.id)
            .collect()
    } else {
        HashSet::new()
    };

    let mut report = TransferReport {
        source_bucket: src_id.clone(),
        destination_bucket: dst_id.clone(),
        ..TransferReport::default()
    };

    for table in &tables {
        let new_id = rewrite_table_id(&table.id, &src_id, &dst_id);
        if existing.contains(&new_id) {
            tracing::info!(table = %new_id, "table already present, skipping");
            report.skipped.push(new_id);
            continue;
        }

        let staged = staging_file(table_name(table), workdir)?;
        let copied = (|| {
            source.export_table(&table.id, staged.path())?;
            if !bucket_exists {
                destination.create_bucket(&dst)?;
                tracing::info!(bucket = %dst_id, "destination bucket created");
                bucket_exists = true;
                report.created_bucket = true;
            }
            destination.create_table_from_file(
                &dst_id,
                table_name(table),
                staged.path(),
                &table.primary_key,
            )
        })();
        drop(staged);

        let created = copied.map_err(|e| KbcError::TableTransfer {
            table_id: table.id.clone(),
            source: Box::new(e),
        })?;
        tracing::info!(table = %created.id, primary_key = ?table.primary_key, "table transferred");
        report.transferred.push(new_id);
    }

    Ok(report)
}

fn staging_file(name: &str, workdir: Option<&Path>) -> Result<tempfile::NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(name).suffix(".csv");
    let file = match workdir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    Ok(file)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::fake::MemoryProject;

    fn source() -> MemoryProject {
        MemoryProject::new()
            .with_table("in.c-main", "a", &["id"], "\"id\",\"v\"\n\"1\",\"a\"\n")
            .with_table("in.c-main", "b", &["id"], "\"id\",\"v\"\n\"2\",\"b\"\n")
            .with_table(
                "in.c-main",
                "c",
                &["customer_id", "order_id"],
                "\"customer_id\",\"order_id\"\n\"7\",\"9\"\n",
            )
    }

    fn staged_files(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn rerun_copies_only_missing_tables() {
        let src = source();
        let dst = MemoryProject::new()
            .with_table("in.c-main", "a", &["id"], "\"id\",\"v\"\n\"1\",\"a\"\n")
            .with_table("in.c-main", "b", &["id"], "\"id\",\"v\"\n\"2\",\"b\"\n");
        let work = tempfile::tempdir().unwrap();

        let report = transfer_bucket(&src, &dst, "in.c-main", None, Some(work.path())).unwrap();

        assert_eq!(report.transferred, vec!["in.c-main.c"]);
        assert_eq!(report.skipped, vec!["in.c-main.a", "in.c-main.b"]);
        assert!(!report.created_bucket);
        assert_eq!(src.calls_matching("export"), vec!["export in.c-main.c"]);
        assert_eq!(dst.calls_matching("import").len(), 1);
        assert!(dst.calls_matching("create_bucket").is_empty());
        assert_eq!(
            dst.table_ids(),
            vec!["in.c-main.a", "in.c-main.b", "in.c-main.c"]
        );
        let tables = dst.tables.borrow();
        let c = &tables["in.c-main.c"];
        assert_eq!(c.table.primary_key, vec!["customer_id", "order_id"]);
        assert!(c.csv.contains("\"7\",\"9\""));
        assert_eq!(staged_files(&work), 0);
    }

    #[test]
    fn missing_bucket_is_created_once() {
        let src = source();
        let dst = MemoryProject::new();
        let work = tempfile::tempdir().unwrap();

        let report = transfer_bucket(&src, &dst, "in.c-main", None, Some(work.path())).unwrap();

        assert!(report.created_bucket);
        assert_eq!(report.transferred.len(), 3);
        assert_eq!(dst.calls_matching("create_bucket"), vec!["create_bucket in.c-main"]);
        // bucket is created after the first export, before the first import
        let calls = dst.calls.borrow();
        assert!(calls[0].starts_with("create_bucket"));
        assert!(calls[1].starts_with("import in.c-main.a"));
    }

    #[test]
    fn destination_bucket_override_rewrites_ids() {
        let src = source();
        let dst = MemoryProject::new();
        let report =
            transfer_bucket(&src, &dst, "in.c-main", Some("out.c-archive"), None).unwrap();
        assert_eq!(report.destination_bucket, "out.c-archive");
        assert_eq!(
            dst.table_ids(),
            vec!["out.c-archive.a", "out.c-archive.b", "out.c-archive.c"]
        );
    }

    #[test]
    fn empty_source_bucket_creates_nothing() {
        let src = MemoryProject::new();
        let dst = MemoryProject::new();
        let report = transfer_bucket(&src, &dst, "in.c-empty", None, None).unwrap();
        assert!(report.transferred.is_empty());
        assert!(!report.created_bucket);
        assert!(dst.calls.borrow().is_empty());
    }

    #[test]
    fn failing_table_aborts_and_cleans_up() {
        let src = source();
        let dst = MemoryProject::new().failing_import("b");
        let work = tempfile::tempdir().unwrap();

        let err = transfer_bucket(&src, &dst, "in.c-main", None, Some(work.path())).unwrap_err();

        match &err {
            KbcError::TableTransfer { table_id, .. } => assert_eq!(table_id, "in.c-main.b"),
            other => panic!("expected TableTransfer, got {other:?}"),
        }
        assert_eq!(err.status(), Some(400));
        assert_eq!(dst.table_ids(), vec!["in.c-main.a"]);
        assert!(src.calls_matching("export in.c-main.c").is_empty());
        assert_eq!(staged_files(&work), 0);
    }

    #[test]
    fn invalid_bucket_id_fails_before_any_call() {
        let src = source();
        let dst = MemoryProject::new();
        let err = transfer_bucket(&src, &dst, "main", None, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(src.calls.borrow().is_empty());
        assert!(dst.calls.borrow().is_empty());
    }

    #[test]
    fn table_id_rewrite() {
        assert_eq!(
            rewrite_table_id("in.c-main.orders", "in.c-main", "out.c-copy"),
            "out.c-copy.orders"
        );
        assert_eq!(
            rewrite_table_id("in.c-other.orders", "in.c-main", "in.c-main"),
            "in.c-main.orders"
        );
    }
}
