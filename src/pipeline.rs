// src/pipeline.rs

use anyhow::{Context, Result};
use std::sync::Arc;
use futures::{stream::FuturesUnordered, StreamExt};
use tokio::{sync::Semaphore, task::AbortHandle, time::Instant};
use tracing::{error, info, instrument};

use crate::aggregate::{aggregate, FinalDataset};
use crate::apportion::{apportion, PrecinctMap};
use crate::config::{Config, JurisdictionConfig, Source};
use crate::error::{ExtractionError, PipelineError};
use crate::extract::extract;
use crate::fetch::Fetcher;
use crate::normalize::apply_steps;
use crate::resolve::{resolve, AuthorityTable};
use crate::table::{delimited, html, RawTable};
use crate::tally::{NamedCount, Tally};

/// Fetch, extract and normalize every configured jurisdiction, then resolve
/// names against the authority table and assemble the dataset.
///
/// Any jurisdiction failure aborts the whole run; no partial dataset is built.
#[instrument(level = "info", skip_all, fields(jurisdictions = config.jurisdictions.len()))]
pub async fn run(config: &Config) -> Result<FinalDataset> {
    let start = Instant::now();
    let fetcher = Fetcher::new(&config.fetch)?;

    // the reference table loads while the jurisdictions are being fetched
    let authority = {
        let path = config.authority.path.clone();
        let cols = config.authority.columns.clone();
        tokio::task::spawn_blocking(move || AuthorityTable::load_csv(&path, &cols))
    };

    let tallies = collect_tallies(config, &fetcher).await?;

    let table = authority
        .await
        .context("authority table loader did not complete")??;

    let resolved = resolve(tallies, &table, &config.resolve)?;
    let dataset = aggregate(resolved);

    for (code, names) in dataset.unresolved() {
        error!(jurisdiction = %code, ?names, "dataset carries unresolved regions keyed by name");
    }
    info!(
        jurisdictions = dataset.len(),
        records = dataset.record_count(),
        elapsed = ?start.elapsed(),
        "dataset assembled"
    );
    Ok(dataset)
}

/// Run one task per jurisdiction and wait for all of them. Results come back
/// in configuration order; the first failure to complete aborts the rest.
pub async fn collect_tallies(
    config: &Config,
    fetcher: &Fetcher,
) -> Result<Vec<(String, Tally)>, PipelineError> {
    let sem = Arc::new(Semaphore::new(config.fetch.max_concurrency));
    let mut aborts: Vec<AbortHandle> = Vec::with_capacity(config.jurisdictions.len());
    let mut running = FuturesUnordered::new();

    for (idx, j) in config.jurisdictions.iter().enumerate() {
        let j = j.clone();
        let fetcher = fetcher.clone();
        let sem = Arc::clone(&sem);
        let code = j.code.clone();
        let handle = tokio::spawn(async move { process_jurisdiction(j, fetcher, sem).await });
        aborts.push(handle.abort_handle());
        running.push(async move { (idx, code, handle.await) });
    }

    let mut slots: Vec<Option<(String, Tally)>> = vec![None; config.jurisdictions.len()];
    while let Some((idx, code, joined)) = running.next().await {
        let outcome = joined.unwrap_or_else(|e| {
            Err(PipelineError::Task {
                jurisdiction: code.clone(),
                message: e.to_string(),
            })
        });
        match outcome {
            Ok(tally) => slots[idx] = Some((code, tally)),
            Err(e) => {
                error!(jurisdiction = %code, error = %e, "jurisdiction failed; aborting run");
                aborts.iter().for_each(AbortHandle::abort);
                return Err(e);
            }
        }
    }
    Ok(slots.into_iter().flatten().collect())
}

#[instrument(level = "info", skip_all, fields(jurisdiction = %j.code, name = %j.name))]
async fn process_jurisdiction(
    j: JurisdictionConfig,
    fetcher: Fetcher,
    sem: Arc<Semaphore>,
) -> Result<Tally, PipelineError> {
    let text = match source_location(&j.source) {
        Some(location) => {
            let _permit = sem
                .acquire()
                .await
                .map_err(|e| PipelineError::source(&j.code, e.into()))?;
            let start = Instant::now();
            let text = fetcher
                .read_text(location)
                .await
                .map_err(|e| PipelineError::source(&j.code, e))?;
            info!(bytes = text.len(), elapsed = ?start.elapsed(), "source read");
            Some(text)
        }
        None => None,
    };

    // parsing and apportionment are CPU work; keep them off the async workers
    let code = j.code.clone();
    let tally = tokio::task::spawn_blocking(move || build_tally(&j, text.as_deref()))
        .await
        .map_err(|e| PipelineError::Task {
            jurisdiction: code,
            message: e.to_string(),
        })??;

    info!(regions = tally.len(), total = ?tally.total(), "tally ready");
    Ok(tally)
}

/// Document location to read, with any `#anchor` removed.
fn source_location(source: &Source) -> Option<&str> {
    match source {
        Source::Html { location, .. } => Some(html::split_anchor(location).0),
        Source::Delimited { location, .. } | Source::Precinct { location, .. } => Some(location),
        Source::Static { .. } => None,
    }
}

/// Everything after the source text is in hand: grid → tally → steps.
pub fn build_tally(j: &JurisdictionConfig, text: Option<&str>) -> Result<Tally, PipelineError> {
    let extraction = |e: ExtractionError| PipelineError::extraction(&j.code, e);
    let body = || {
        text.ok_or_else(|| PipelineError::source(&j.code, anyhow::anyhow!("source text missing")))
    };

    let tally = match &j.source {
        Source::Html {
            location,
            locator,
            rows,
        } => {
            let anchor = html::split_anchor(location).1.ok_or_else(|| {
                extraction(ExtractionError::TableNotFound(format!(
                    "location {location:?} has no #section anchor"
                )))
            })?;
            let grid = html::locate_table(body()?, anchor, *locator, *rows).map_err(extraction)?;
            tally_from_grid(&grid, j).map_err(extraction)?
        }
        Source::Delimited { delimiter, .. } => {
            let grid = delimited::parse_delimited(body()?.as_bytes(), *delimiter as u8)
                .map_err(|e| PipelineError::source(&j.code, e))?;
            tally_from_grid(&grid, j).map_err(extraction)?
        }
        Source::Precinct {
            precinct_map,
            apportion: spec,
            ..
        } => {
            let grid = delimited::parse_csv_str(body()?)
                .map_err(|e| PipelineError::source(&j.code, e))?;
            let map =
                PrecinctMap::load(precinct_map).map_err(|e| PipelineError::source(&j.code, e))?;
            apportion(&grid, &map, spec).map_err(|e| PipelineError::apportionment(&j.code, e))?
        }
        Source::Static { counts } => Tally::from_counts(
            counts
                .iter()
                .map(|c| NamedCount::new(c.name.as_str(), c.count))
                .collect(),
        )
        .map_err(extraction)?,
    };

    apply_steps(tally, &j.steps).map_err(extraction)
}

fn tally_from_grid(grid: &RawTable, j: &JurisdictionConfig) -> Result<Tally, ExtractionError> {
    let counts = extract(grid, &j.extract)?;
    Tally::from_counts(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, path::Path};
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,votescraper=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn write_file(dir: &Path, name: &str, content: &str) -> anyhow::Result<String> {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path)?;
        f.write_all(content.as_bytes())?;
        Ok(path.to_string_lossy().to_string())
    }

    const WISCONSIN_HTML: &str = r#"<html><body>
<h3><span id="By_county">By county</span></h3>
<table class="wikitable"><tbody>
<tr><th>County</th><th>Clinton</th><th>Trump</th><th>Total</th></tr>
<tr><td>Adams</td><td>3,745</td><td>5,966</td><td>10,130</td></tr>
<tr><td>St Croix</td><td>21,000</td><td>26,000</td><td>50,000</td></tr>
<tr><td>Totals</td><td>24,745</td><td>31,966</td><td>60,999</td></tr>
</tbody></table>
</body></html>"#;

    const GEOCODES: &str = "Summary Level,State Code,County Code,Sub,Place,City,Area Name\n\
        040,02,000,00000,00000,00000,Alaska\n\
        050,02,090,00000,00000,00000,Fairbanks North Star Borough\n\
        050,02,240,00000,00000,00000,Southeast Fairbanks Census Area\n\
        040,11,000,00000,00000,00000,District of Columbia\n\
        050,11,001,00000,00000,00000,District of Columbia\n\
        040,55,000,00000,00000,00000,Wisconsin\n\
        050,55,001,00000,00000,00000,Adams County\n\
        050,55,109,00000,00000,00000,St. Croix County\n";

    fn config_yaml(dir: &Path) -> anyhow::Result<String> {
        let wi = write_file(dir, "wi.html", WISCONSIN_HTML)?;
        let geo = write_file(dir, "geo.csv", GEOCODES)?;
        let ak = write_file(
            dir,
            "ak.csv",
            "\"01-446 Aurora\" ,\"US PRESIDENT\" ,\"Clinton, Hillary\" ,\"DEM\" ,\"\" ,30\n\
             \"01-455 Badger\" ,\"US PRESIDENT\" ,\"Trump, Donald\" ,\"REP\" ,\"\" ,70\n\
             \"District 1 - Absentee\" ,\"US PRESIDENT\" ,\"Trump, Donald\" ,\"REP\" ,\"\" ,9\n",
        )?;
        let map = write_file(
            dir,
            "ak_map.csv",
            "01-446,Fairbanks North Star Borough\n01-455,Southeast Fairbanks Census Area\n",
        )?;
        Ok(format!(
            r#"
authority: {{ path: "{geo}" }}
jurisdictions:
  - code: "02"
    name: Alaska
    source: {{ kind: precinct, location: "{ak}", precinct_map: "{map}" }}
  - code: "11"
    name: Washington D.C.
    source:
      kind: static
      counts:
        - {{ name: district of columbia, count: 311268 }}
        - {{ name: total, count: 311268 }}
  - code: "55"
    name: Wisconsin
    source: {{ kind: html, location: "{wi}#By_county" }}
    steps:
      - {{ op: rename, from: st croix, to: st. croix }}
      - {{ op: rename, from: totals, to: total }}
"#
        ))
    }

    #[tokio::test]
    async fn end_to_end_run_over_local_sources() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let cfg = Config::from_yaml(&config_yaml(dir.path())?)?;

        let ds = run(&cfg).await?;
        let codes: Vec<_> = ds.jurisdictions().iter().map(|j| j.code.as_str()).collect();
        assert_eq!(codes, vec!["02", "11", "55"]);
        assert_eq!(ds.unresolved().count(), 0);

        let triples: Vec<(&str, &str, u64)> = ds
            .records()
            .map(|(_, r)| (r.region_id.as_str(), r.name.as_str(), r.count))
            .collect();
        assert_eq!(
            triples,
            vec![
                ("02", "Alaska", 108),
                ("02090", "Fairbanks North Star Borough", 32),
                ("02240", "Southeast Fairbanks Census Area", 76),
                ("11", "District of Columbia", 311_268),
                ("11001", "District of Columbia", 311_268),
                ("55", "Wisconsin", 60_999),
                ("55001", "Adams County", 10_130),
                ("55109", "St. Croix County", 50_000),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn one_failing_jurisdiction_aborts_the_run() -> anyhow::Result<()> {
        init_test_logging();
        let dir = tempfile::tempdir()?;
        let bad = write_file(dir.path(), "bad.csv", "adams,12\nbrown,lots\n")?;
        let geo = write_file(dir.path(), "geo.csv", GEOCODES)?;
        let yaml = format!(
            r#"
authority: {{ path: "{geo}" }}
jurisdictions:
  - code: "11"
    name: DC
    source: {{ kind: static, counts: [{{ name: district of columbia, count: 1 }}] }}
  - code: "55"
    name: Wisconsin
    source: {{ kind: delimited, location: "{bad}" }}
    steps: [{{ op: compute_total }}]
"#
        );
        let cfg = Config::from_yaml(&yaml)?;
        let err = run(&cfg).await.unwrap_err();
        let pipeline_err = err
            .downcast_ref::<PipelineError>()
            .expect("error should be a PipelineError");
        assert_eq!(pipeline_err.jurisdiction(), "55");
        assert!(matches!(
            pipeline_err,
            PipelineError::Extraction {
                source: ExtractionError::MalformedCount { row: 1, .. },
                ..
            }
        ));
        Ok(())
    }

    #[test]
    fn html_source_without_anchor_is_an_extraction_error() -> anyhow::Result<()> {
        let cfg = Config::from_yaml(
            r#"
authority: { path: x.csv }
jurisdictions:
  - { code: "01", name: A, source: { kind: html, location: "page.html" } }
"#,
        )?;
        let err = build_tally(&cfg.jurisdictions[0], Some("<html></html>")).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extraction {
                source: ExtractionError::TableNotFound(_),
                ..
            }
        ));
        Ok(())
    }
}
