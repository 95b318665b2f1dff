mod bootstrap;

use align_arrays::{
    add_history_to_data_array, data_array, data_array_with_kinematics, paired_tables,
    random_window_array, ArrayOptions, KinematicOptions, PairingRules, Reducer,
};
use align_core::models::TrialTable;
use align_core::params::{figure_dir, seeded_rng, N_ITER};
use align_core::serial::DenseArray;
use align_core::settings::{BuildArgs, Command, SessionArgs, Settings};
use align_core::style::{rc_params, Colors, Panels, RcValue, LARGE_FIG, MED_FIG};
use align_data::catalog::{
    find_mat_files, load_area_sessions, load_example_sessions, SessionCatalog,
    DEFAULT_SKIP_MARKERS,
};
use align_data::reader::load_trial_table;
use anyhow::{bail, Context, Result};

fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("neural-align v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Root: {}, area: {}, seed: {}",
        settings.data_root().display(),
        settings.area,
        settings.seed
    );

    match &settings.command {
        Command::Summary { sessions } => {
            for table in load_tables(&settings, sessions)? {
                println!("{}", table.summary());
            }
        }

        Command::Pairs {
            sessions,
            shared_markers,
        } => {
            let tables = load_tables(&settings, sessions)?;
            let rules = PairingRules {
                shared_markers: shared_markers.clone(),
            };
            for (i, j) in paired_tables(&tables, &rules) {
                println!("{}\t{}\t{}\t{}", i, j, tables[i].session, tables[j].session);
            }
        }

        Command::Build(args) => build(&settings, args)?,

        Command::Style => {
            let style = serde_json::json!({
                "large_fig": LARGE_FIG,
                "med_fig": MED_FIG,
                "panel_heights": Panels::heights(),
                "panels": Panels::sizes(),
                "colors": Colors::all(),
                "figure_dir": figure_dir(&std::env::current_dir()?),
                "seed": settings.seed,
                "n_iter": N_ITER,
                "rc_params": rc_params(Vec::<(String, RcValue)>::new()),
            });
            println!("{}", serde_json::to_string_pretty(&style)?);
        }
    }

    Ok(())
}

fn load_tables(settings: &Settings, sessions: &SessionArgs) -> Result<Vec<TrialTable>> {
    let root = settings.data_root();

    if let Some(path) = &sessions.catalog {
        let catalog = SessionCatalog::load_from(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        if sessions.examples {
            return Ok(load_example_sessions(&root, &catalog, None)?);
        }
        let (refs, tables) =
            load_area_sessions(&root, &catalog, &settings.area, DEFAULT_SKIP_MARKERS, Ok)?;
        for session in &refs {
            tracing::debug!("Catalog session {}/{}", session.subject, session.session);
        }
        return Ok(tables);
    }

    let files = if sessions.all {
        let found = find_mat_files(&root);
        if found.is_empty() {
            bail!("no raw session files under {}", root.display());
        }
        found
    } else {
        sessions
            .files
            .iter()
            .map(|file| settings.resolve_file(file))
            .collect()
    };

    files
        .iter()
        .map(|path| {
            load_trial_table(path).with_context(|| format!("loading {}", path.display()))
        })
        .collect()
}

fn build(settings: &Settings, args: &BuildArgs) -> Result<()> {
    let tables = load_tables(settings, &args.sessions)?;
    let mut rng = seeded_rng(settings.seed);

    let (mut data, kinematics) = match (args.epoch(), &args.kinematics) {
        (Some(epoch), Some(field)) => {
            let options = KinematicOptions {
                field: field.clone(),
                normalize: args.normalize_kinematics,
            };
            let (data, kin) = data_array_with_kinematics(
                &tables,
                &epoch,
                &settings.area,
                args.components,
                &options,
                &mut rng,
            )?;
            (data, Some(kin))
        }
        (None, _) if args.window_len.is_some() => {
            let mut reducer = Reducer::from(args.components);
            let data = random_window_array(
                &tables,
                args.window_len,
                &settings.area,
                &mut reducer,
                &mut rng,
            )?;
            (data, None)
        }
        (epoch, _) => {
            let mut options = ArrayOptions {
                epoch,
                area: settings.area.clone(),
                reducer: Reducer::from(args.components),
            };
            (data_array(&tables, &mut options, &mut rng)?, None)
        }
    };

    if args.history > 0 {
        data = add_history_to_data_array(&data, args.history);
    }
    tracing::info!("Array shape: {:?}", data.shape());
    println!("{:?}", data.shape());

    if let Some(output) = &args.output {
        let document = serde_json::json!({
            "data": DenseArray::from_array(&data),
            "kinematics": kinematics.as_ref().map(DenseArray::from_array),
        });
        std::fs::write(output, serde_json::to_string(&document)?)
            .with_context(|| format!("writing {}", output.display()))?;
        tracing::info!("Wrote {}", output.display());
    }

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::models::Trial;
    use align_data::reader::write_cached_table;
    use clap::Parser;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_session(root: &Path, subject: &str, session: &str) {
        let trials = (0..2)
            .map(|i| Trial {
                trial_id: i,
                target_id: i,
                indices: BTreeMap::new(),
                scalars: BTreeMap::new(),
                signals: BTreeMap::new(),
            })
            .collect();
        let table = TrialTable::new(subject, session, trials).unwrap();
        let dir = root.join(subject);
        std::fs::create_dir_all(&dir).unwrap();
        write_cached_table(&table, &dir.join(format!("{}.json", session))).unwrap();
    }

    fn settings_for(root: &Path, args: &[&str]) -> Settings {
        let mut argv = vec!["neural-align", "--root", root.to_str().unwrap()];
        argv.extend_from_slice(args);
        Settings::parse_from(argv)
    }

    fn sessions_of(settings: &Settings) -> &SessionArgs {
        match &settings.command {
            Command::Summary { sessions } => sessions,
            other => panic!("unexpected command {:?}", other),
        }
    }

    // ── load_tables ───────────────────────────────────────────────────────────

    #[test]
    fn test_catalog_area_skips_marked_subjects() {
        let tmp = TempDir::new().unwrap();
        write_session(tmp.path(), "Chewie", "c1");
        write_session(tmp.path(), "Mihili", "m1");
        write_session(tmp.path(), "MrT", "t1");
        let catalog = tmp.path().join("catalog.json");
        std::fs::write(
            &catalog,
            r#"{
                "areas": {"M1": {"Chewie": ["c1.json"], "Mihili": ["m1.json"], "MrT": ["t1.json"]}},
                "examples": ["MrT/t1.json"]
            }"#,
        )
        .unwrap();

        let settings = settings_for(
            tmp.path(),
            &["summary", "--catalog", catalog.to_str().unwrap()],
        );
        let tables = load_tables(&settings, sessions_of(&settings)).unwrap();
        let subjects: Vec<&str> = tables.iter().map(|t| t.subject.as_str()).collect();
        assert_eq!(subjects, vec!["Chewie", "Mihili"]);

        let settings = settings_for(
            tmp.path(),
            &["summary", "--catalog", catalog.to_str().unwrap(), "--examples"],
        );
        let tables = load_tables(&settings, sessions_of(&settings)).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].subject, "MrT");
    }

    #[test]
    fn test_catalog_without_area_fails() {
        let tmp = TempDir::new().unwrap();
        let catalog = tmp.path().join("catalog.json");
        std::fs::write(&catalog, r#"{"areas": {"PMd": {}}}"#).unwrap();

        let settings = settings_for(
            tmp.path(),
            &["summary", "--catalog", catalog.to_str().unwrap()],
        );
        assert!(load_tables(&settings, sessions_of(&settings)).is_err());
    }

    #[test]
    fn test_all_without_raw_files_fails() {
        let tmp = TempDir::new().unwrap();
        write_session(tmp.path(), "Chewie", "c1");
        let settings = settings_for(tmp.path(), &["summary", "--all"]);
        let err = load_tables(&settings, sessions_of(&settings)).unwrap_err();
        assert!(err.to_string().contains("no raw session files"));
    }

    #[test]
    fn test_explicit_files_resolve_against_root() {
        let tmp = TempDir::new().unwrap();
        write_session(tmp.path(), "Chewie", "c1");
        let settings = settings_for(tmp.path(), &["summary", "Chewie/c1.json"]);
        let tables = load_tables(&settings, sessions_of(&settings)).unwrap();
        assert_eq!(tables[0].session, "c1");
    }
}
