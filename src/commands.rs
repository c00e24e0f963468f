use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::core::cache::{ArtifactRole, StagedFile};
use crate::core::error::ProvisionResult;
use crate::core::mappings::MappingTable;
use crate::core::patch::PatchSet;
use crate::core::pipeline::Provisioner;
use crate::core::remap::RemapDirection;
use crate::core::state::{ProvisionSettings, SETTINGS_FILE};
use crate::core::worker::{MergePlan, TransformKind, TransformRequest, WorkerPool};

#[derive(Debug, Parser)]
#[command(name = "jarloom", version, about = "Provision merged, deobfuscated game jars")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Resolve, fetch, patch and merge one version into the cache.
    Provide {
        version: String,
        /// Settings file (defaults to the user config directory).
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        offline: bool,
        /// Re-run every stage even when its output exists.
        #[arg(long)]
        refresh: bool,
    },
    /// Remap one jar through a TSRG table.
    Remap {
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        mappings: PathBuf,
        #[arg(long)]
        reverse: bool,
        #[arg(long)]
        strict: bool,
        #[arg(long, num_args = 1..)]
        classpath: Vec<PathBuf>,
    },
    /// Structurally merge a client and a server jar.
    Merge {
        client: PathBuf,
        server: PathBuf,
        output: PathBuf,
        #[arg(long)]
        no_synthetic_offset: bool,
    },
    /// Apply a patch bundle, then copy over the classes it left out.
    Patch {
        base: PathBuf,
        bundle: PathBuf,
        output: PathBuf,
    },
    /// Run an external tool configured in the settings file.
    RunTool {
        name: String,
        input: PathBuf,
        output: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, num_args = 1..)]
        extra: Vec<PathBuf>,
        #[arg(long, num_args = 1..)]
        classpath: Vec<PathBuf>,
    },
}

fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jarloom")
        .join(SETTINGS_FILE)
}

fn load_settings(config: Option<PathBuf>) -> ProvisionResult<ProvisionSettings> {
    let path = config.unwrap_or_else(default_settings_path);
    info!("Using settings {:?}", path);
    ProvisionSettings::load_or_default(&path)
}

pub async fn dispatch(cli: Cli) -> ProvisionResult<()> {
    match cli.command {
        Command::Provide {
            version,
            config,
            offline,
            refresh,
        } => {
            let mut settings = load_settings(config)?;
            settings.offline |= offline;
            settings.refresh |= refresh;
            let provisioner = Provisioner::new(settings)?;
            let run = provisioner.provide(&version).await?;
            if let Some(merged) = run.artifact(ArtifactRole::Merged) {
                println!("{}", merged.path.display());
            }
        }
        Command::Remap {
            input,
            output,
            mappings,
            reverse,
            strict,
            classpath,
        } => {
            let direction = if reverse {
                RemapDirection::Reverse
            } else {
                RemapDirection::Forward
            };
            let kind = TransformKind::Remap {
                mappings: Arc::new(MappingTable::load(&mappings)?),
                direction,
                strict,
            };
            let request = TransformRequest::new(kind, input, output).with_classpath(classpath);
            WorkerPool::new(1).run(request).await?;
        }
        Command::Merge {
            client,
            server,
            output,
            no_synthetic_offset,
        } => {
            let plan = MergePlan::Structural {
                server,
                synthetic_offset: !no_synthetic_offset,
            };
            WorkerPool::new(1)
                .run(TransformRequest::new(TransformKind::Merge(plan), client, output))
                .await?;
        }
        Command::Patch {
            base,
            bundle,
            output,
        } => {
            let pool = WorkerPool::new(1);
            let patches = Arc::new(PatchSet::load(&bundle)?);
            let staged = StagedFile::new(&output)?;
            pool.run(TransformRequest::new(
                TransformKind::ApplyPatches { patches },
                &base,
                staged.path(),
            ))
            .await?;
            pool.run(TransformRequest::new(TransformKind::CopyMissing, &base, staged.path()))
                .await?;
            staged.commit()?;
        }
        Command::RunTool {
            name,
            input,
            output,
            config,
            extra,
            classpath,
        } => {
            let provisioner = Provisioner::new(load_settings(config)?)?;
            let outcome = provisioner
                .run_tool(&name, &input, &output, extra, classpath)
                .await?;
            info!("{} finished in {:?}", name, outcome.duration);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provide_flags_parse() {
        let cli = Cli::try_parse_from(["jarloom", "provide", "1.20.1", "--offline"]).unwrap();
        match cli.command {
            Command::Provide {
                version,
                offline,
                refresh,
                config,
            } => {
                assert_eq!(version, "1.20.1");
                assert!(offline);
                assert!(!refresh);
                assert!(config.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remap_takes_several_classpath_jars() {
        let cli = Cli::try_parse_from([
            "jarloom",
            "remap",
            "in.jar",
            "out.jar",
            "--mappings",
            "joined.tsrg",
            "--reverse",
            "--classpath",
            "a.jar",
            "b.jar",
        ])
        .unwrap();
        match cli.command {
            Command::Remap {
                reverse,
                strict,
                classpath,
                ..
            } => {
                assert!(reverse);
                assert!(!strict);
                assert_eq!(classpath, vec![PathBuf::from("a.jar"), PathBuf::from("b.jar")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn remap_requires_mappings() {
        assert!(Cli::try_parse_from(["jarloom", "remap", "in.jar", "out.jar"]).is_err());
    }

    #[tokio::test]
    async fn patch_command_applies_and_copies_missing() {
        use crate::core::archive::read_all;
        use crate::core::patch::BinPatch;
        use crate::core::testing::write_jar;

        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.jar");
        write_jar(&base, &[("A.class", b"aaaa"), ("B.class", b"bbbb")]);
        let bundle = dir.path().join("patches.zip");
        PatchSet::new(vec![
            BinPatch::diff("A.class", Some(b"aaaa".as_slice()), b"patched a").unwrap(),
        ])
        .write_bundle(&bundle)
        .unwrap();
        let out = dir.path().join("out.jar");

        let cli = Cli {
            command: Command::Patch {
                base,
                bundle,
                output: out.clone(),
            },
        };
        dispatch(cli).await.unwrap();
        let entries = read_all(&out).unwrap();
        assert_eq!(entries["A.class"], b"patched a");
        assert_eq!(entries["B.class"], b"bbbb");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }
}
