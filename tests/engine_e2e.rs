//! End-to-end scenarios over the engine stack: download detection,
//! archive extraction, prefix collision handling, bounded pagination, and
//! a full task pipeline against the scripted driver.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_driver::{Driver, ElementHandle, FakeDriver, FakeEffect, FakeElement, Strategy};
use download_watch::{apply_prefix, extract_archive, DownloadWatch, NameFilter, WatchConfig};
use element_locator::{Locator, LocatorList};
use row_pager::{PageVisitor, PagerConfig, PagerError, Paginator};
use task_flow::{
    process_rows, RowRecord, RowSkip, RowStage, StepError, TaskPipeline, TaskStage,
};
use ui_actions::{ActionConfig, ActionExecutor};

fn fast_watch_cfg() -> WatchConfig {
    WatchConfig {
        in_progress_suffixes: vec![".crdownload".to_string()],
        poll_interval_ms: 10,
    }
}

fn fast_executor(fake: &FakeDriver) -> Arc<ActionExecutor> {
    Arc::new(ActionExecutor::with_config(
        Arc::new(fake.clone()),
        ActionConfig {
            resolve_timeout: Duration::from_millis(200),
            native_click_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
        },
    ))
}

fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (name, bytes) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap();
}

// Scenario A: an in-progress download appears after the snapshot and is
// reported once finalized under its real name.
#[tokio::test]
async fn scenario_a_in_progress_download_resolves_to_final_name() {
    let dir = tempfile::tempdir().unwrap();
    let watch =
        DownloadWatch::begin_with(dir.path(), NameFilter::any(), fast_watch_cfg()).unwrap();

    let partial = dir.path().join("report.csv.crdownload");
    let final_path = dir.path().join("report.csv");
    let writer = {
        let partial = partial.clone();
        let final_path = final_path.clone();
        tokio::spawn(async move {
            fs::write(&partial, b"col1,col2\n1,2\n").unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            fs::rename(&partial, &final_path).unwrap();
        })
    };

    let found = watch.await_new_file(Duration::from_secs(5)).await.unwrap();
    writer.await.unwrap();
    assert_eq!(found, final_path);
}

// Scenario B: one top-level folder with three files collapses into the
// destination directly.
#[test]
fn scenario_b_single_top_level_directory_is_collapsed() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("FSist XMLs N 0001.zip");
    build_zip(
        &archive,
        &[
            ("Data/nota1.xml", b"<n1/>".as_slice()),
            ("Data/nota2.xml", b"<n2/>".as_slice()),
            ("Data/nota3.pdf", b"%PDF".as_slice()),
        ],
    );

    let dest = dir.path().join("Final");
    extract_archive(&archive, &dest).unwrap();

    let mut names: Vec<String> = fs::read_dir(&dest)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["nota1.xml", "nota2.xml", "nota3.pdf"]);
}

// Scenario C: prefixing with a collision yields " (2)".
#[test]
fn scenario_c_prefix_collision_gets_a_counter() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ACME invoice.pdf"), b"earlier").unwrap();
    let source = dir.path().join("invoice.pdf");
    fs::write(&source, b"fresh").unwrap();

    let renamed = apply_prefix(&source, "ACME").unwrap();
    assert_eq!(renamed, dir.path().join("ACME invoice (2).pdf"));
    assert_eq!(fs::read(dir.path().join("ACME invoice.pdf")).unwrap(), b"earlier");
}

struct PageCounter {
    visited: Vec<u32>,
}

#[async_trait]
impl PageVisitor for PageCounter {
    async fn visit(&mut self, page: u32, _rows: Vec<ElementHandle>) -> Result<(), PagerError> {
        self.visited.push(page);
        Ok(())
    }
}

// Scenario D: a "next" control that always works still stops at the bound.
#[tokio::test]
async fn scenario_d_pagination_respects_the_bound() {
    let fake = FakeDriver::new();
    fake.add_element(
        FakeElement::new()
            .by_css("ul.pagination li a[rel='next']")
            .on_click(FakeEffect::Count("advance".to_string())),
    );

    let paginator = Paginator::with_config(
        fast_executor(&fake),
        PagerConfig {
            max_pages: 3,
            settle_delay_ms: 1,
            table_probe_timeout_ms: 10,
        },
        row_pager::default_next_candidates(),
    );

    let mut visitor = PageCounter { visited: Vec::new() };
    let summary = paginator
        .traverse(&LocatorList::single(Locator::css("table tbody")), &mut visitor)
        .await
        .unwrap();

    assert_eq!(visitor.visited, vec![1, 2, 3]);
    assert_eq!(summary.pages_visited, 3);
    assert!(summary.stopped_by_bound);
}

struct MiniCtx {
    fake: FakeDriver,
    executor: Arc<ActionExecutor>,
    download_dir: std::path::PathBuf,
    archive_dest: std::path::PathBuf,
}

// Full pipeline over the scripted driver: navigate, click an export
// control that drops a zip into the download dir, wait for it, extract
// it, and record row outcomes with one broken row isolated.
#[tokio::test]
async fn mini_workflow_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeDriver::with_url("https://portal/login");
    let zip_path = dir.path().join("FSist XMLs N 77.zip");
    build_zip(
        &zip_path.with_extension("staged"),
        &[("Data/nota.xml", b"<nota/>".as_slice())],
    );

    // The export button "downloads" the staged zip into the watched dir.
    fake.add_element(
        FakeElement::new()
            .by_id("butDownload")
            .on_click(FakeEffect::RenameFile {
                from: zip_path.with_extension("staged"),
                to: zip_path.clone(),
            })
            .on_click(FakeEffect::Count("export".to_string())),
    );

    // A three-row table; the second row's menu trigger is missing.
    let body = fake.add_element(FakeElement::new().by_css("table tbody"));
    for row_index in 0..3 {
        let row = fake.add_element(FakeElement::new().child_of(body).by_css("tr"));
        fake.add_element(
            FakeElement::new()
                .child_of(row)
                .by_css("td")
                .text(format!("Empresa {row_index}")),
        );
        if row_index != 1 {
            fake.add_element(
                FakeElement::new()
                    .child_of(row)
                    .by_css("a.icone-trigger")
                    .on_click(FakeEffect::Count("menus".to_string())),
            );
        }
    }

    let executor = fast_executor(&fake);
    let mut ctx = MiniCtx {
        fake: fake.clone(),
        executor,
        download_dir: dir.path().to_path_buf(),
        archive_dest: dir.path().join("Final"),
    };

    let report = TaskPipeline::<MiniCtx>::new("mini portal")
        .step(
            TaskStage::Navigated,
            "reach list",
            Duration::from_secs(5),
            |ctx, _report| {
                Box::pin(async move {
                    ctx.fake
                        .navigate("https://portal/notas")
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    Ok(())
                })
            },
        )
        .step(
            TaskStage::Downloaded,
            "rows and export",
            Duration::from_secs(10),
            |ctx, report| {
                Box::pin(async move {
                    let driver = ctx.executor.driver();
                    let table = ctx
                        .executor
                        .resolver()
                        .resolve(&Locator::css("table tbody"), Duration::from_millis(200))
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    let rows = driver
                        .query_within(&table.handle, Strategy::Css, "tr")
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;

                    let executor = ctx.executor.clone();
                    process_rows(report, rows, |index, row| {
                        let executor = executor.clone();
                        async move {
                            let driver = executor.driver();
                            let cells = driver
                                .query_within(&row, Strategy::Css, "td")
                                .await
                                .map_err(|err| RowSkip::at(RowStage::RowFound, err.to_string()))?;
                            let company = match cells.first() {
                                Some(cell) => driver.read_text(cell).await.unwrap_or_default(),
                                None => String::new(),
                            };
                            let trigger = driver
                                .query_within(&row, Strategy::Css, "a.icone-trigger")
                                .await
                                .map_err(|err| RowSkip::at(RowStage::MenuOpened, err.to_string()))?
                                .into_iter()
                                .next()
                                .ok_or_else(|| {
                                    RowSkip::at(RowStage::MenuOpened, "row menu trigger missing")
                                })?;
                            driver
                                .click_script(&trigger)
                                .await
                                .map_err(|err| RowSkip::at(RowStage::MenuOpened, err.to_string()))?;
                            Ok(RowRecord::recorded(
                                index,
                                vec![("empresa".to_string(), company)],
                            ))
                        }
                    })
                    .await;

                    // Trigger the bulk export and wait for the artifact.
                    let watch = DownloadWatch::begin_with(
                        &ctx.download_dir,
                        NameFilter::with_prefix("FSist XMLs N").and_suffix(".zip"),
                        WatchConfig {
                            in_progress_suffixes: vec![".crdownload".to_string()],
                            poll_interval_ms: 10,
                        },
                    )
                    .map_err(|err| StepError::msg(err.to_string()))?;
                    ctx.executor
                        .perform_click(
                            &LocatorList::single(Locator::id("butDownload")),
                            "request export",
                        )
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    let zip = watch
                        .await_new_file(Duration::from_secs(5))
                        .await
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    extract_archive(&zip, &ctx.archive_dest)
                        .map_err(|err| StepError::msg(err.to_string()))?;
                    Ok(())
                })
            },
        )
        .execute(&mut ctx)
        .await;

    assert!(report.is_success(), "error: {:?}", report.error);
    assert_eq!(report.stage_reached, TaskStage::Done);
    assert_eq!(report.rows_recorded(), 2);
    assert_eq!(report.rows_skipped(), 1);
    assert!(ctx.archive_dest.join("nota.xml").exists());
    assert_eq!(fake.counter("menus"), 2);
    assert_eq!(fake.counter("export"), 1);
}
