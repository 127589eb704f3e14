//! Seqmap - reference sequence data tool

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use seqmap_common::logging::{init_logging, LogConfig};
use seqmap_ingest::cache::CacheDir;
use seqmap_ingest::config::{ProviderOptions, SourceConfig};
use seqmap_ingest::fetch::{FetchConfig, Fetcher};
use seqmap_ingest::glycan::{self, GlycanProvider};
use seqmap_ingest::glygen::GlyGenProvider;
use seqmap_ingest::interpro::InterProProvider;
use seqmap_ingest::pfam::PfamProvider;
use seqmap_ingest::sifts::{AbbreviationLevel, SiftsOptions, SiftsSummaryProvider};
use seqmap_ingest::stash::{backup_provider, restore_provider, PROVIDER_DIRS};
use seqmap_ingest::uniprot::{
    reformat, ExchangeFormat, IdMapName, IdMappingOptions, IdMappingProvider, UniProtClient, UniProtConfig,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "seqmap")]
#[command(author, version, about = "Fetch, cache and reformat reference sequence data")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root directory of the provider caches
    #[arg(long, global = true, env = "SEQMAP_CACHE_PATH", default_value = "./CACHE")]
    cache_path: PathBuf,

    /// Rebuild indexes from source instead of loading cached copies
    #[arg(long, global = true)]
    no_cache: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pfam descriptions and PDB mappings
    Pfam {
        #[arg(long)]
        pdb: Option<String>,
        #[arg(long)]
        id: Option<String>,
    },

    /// InterPro descriptions and lineage
    Interpro {
        #[arg(long)]
        id: Option<String>,
    },

    /// GlyGen glycan and glycoprotein lists
    Glygen {
        #[arg(long)]
        glycan: Option<String>,
        #[arg(long)]
        protein: Option<String>,
    },

    /// SIFTS chain level mappings
    Sifts {
        /// Directory or base URL holding the SIFTS CSV files
        #[arg(long, env = "SEQMAP_SIFTS_SOURCE")]
        source: Option<String>,
        #[arg(long, default_value = "test")]
        level: AbbreviationLevel,
        #[arg(long, requires = "chain")]
        entry: Option<String>,
        #[arg(long, requires = "entry")]
        chain: Option<String>,
    },

    /// UniProt id mapping lookup
    IdMapping {
        #[arg(long)]
        acc: String,
        #[arg(long, default_value = "NCBI-taxon")]
        name: IdMapName,
    },

    /// Fetch UniProt entries
    Uniprot {
        /// Comma separated accessions; variants such as P42284-3 are allowed
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
        /// Write records (and raw XML) into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Emit exchange documents instead of parsed records
        #[arg(long)]
        exchange: bool,
        /// Go straight to the secondary service
        #[arg(long)]
        no_primary: bool,
    },

    /// Inspect or clear the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Back up or restore a provider cache
    Stash {
        #[command(subcommand)]
        action: StashAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// List provider directories
    List,
    /// Remove one provider directory, or all of them
    Clear { name: Option<String> },
}

#[derive(Subcommand, Debug)]
enum StashAction {
    Backup {
        /// Provider cache directory; glycan uses its published identifier bundle
        #[arg(long, default_value = "glycan", value_parser = clap::builder::PossibleValuesParser::new(PROVIDER_DIRS))]
        provider: String,
        #[arg(long)]
        remote: PathBuf,
        #[arg(long)]
        prefix: Option<String>,
    },
    Restore {
        #[arg(long, default_value = "glycan", value_parser = clap::builder::PossibleValuesParser::new(PROVIDER_DIRS))]
        provider: String,
        /// Directory or HTTP base URL
        #[arg(long)]
        remote: String,
        #[arg(long)]
        prefix: Option<String>,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let _guard = init_logging(&LogConfig::from_env(log_level)?)?;

    let options = ProviderOptions::new(&cli.cache_path, !cli.no_cache);
    let sources = SourceConfig::from_env();
    sources
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid source configuration: {}", e))?;
    let fetcher = Fetcher::new(FetchConfig::from_env())?;

    match cli.command {
        Command::Pfam { pdb, id } => {
            let pfam = PfamProvider::load(&fetcher, &sources, &options).await?;
            info!(
                "Pfam {}: {} descriptions, {} mapped entries",
                pfam.version(),
                pfam.description_count(),
                pfam.mapped_entry_count()
            );
            if let Some(id) = id {
                print_json(&pfam.description(&id))?;
            }
            if let Some(pdb) = pdb {
                print_json(pfam.mapping(&pdb))?;
            }
        },
        Command::Interpro { id } => {
            let interpro = InterProProvider::load(&fetcher, &sources, &options).await?;
            info!("InterPro: {} entries", interpro.len());
            if let Some(id) = id {
                print_json(&serde_json::json!({
                    "id": id,
                    "description": interpro.description(&id),
                    "type": interpro.entry_type(&id),
                    "lineage": interpro.lineage_with_names(&id),
                }))?;
            }
        },
        Command::Glygen { glycan, protein } => {
            let glygen = GlyGenProvider::load(&fetcher, &sources, &options).await?;
            info!(
                "GlyGen: {} glycans, {} glycoproteins",
                glygen.glycans().len(),
                glygen.glycoproteins().len()
            );
            if let Some(glycan) = glycan {
                println!("{} {}", glycan, glygen.has_glycan(&glycan));
            }
            if let Some(protein) = protein {
                println!("{} {}", protein, glygen.has_glycoprotein(&protein));
            }
        },
        Command::Sifts {
            source,
            level,
            entry,
            chain,
        } => {
            let mut sifts_options = SiftsOptions::from_env();
            sifts_options.level = level;
            if let Some(source) = source {
                sifts_options.source = source;
            }
            let sifts = SiftsSummaryProvider::load(&fetcher, &sifts_options, &options).await?;
            info!("SIFTS: {} entries", sifts.entry_count());
            if let (Some(entry), Some(chain)) = (entry, chain) {
                print_json(&sifts.seq_align_list(&entry, &chain))?;
            }
        },
        Command::IdMapping { acc, name } => {
            let id_options = IdMappingOptions {
                map_names: vec![name],
                ..Default::default()
            };
            let provider = IdMappingProvider::shared(&fetcher, &sources, &options, &id_options).await?;
            print_json(&provider.mapped_id(&acc, name))?;
        },
        Command::Uniprot {
            ids,
            output,
            exchange,
            no_primary,
        } => {
            let config = UniProtConfig::from_env().with_save_text(output.is_some());
            let mut client = UniProtClient::new(config, fetcher)?;
            let (records, matches) = client.fetch_list(&ids, !no_primary, true).await;

            let document = if exchange {
                serde_json::to_value(reformat(&records, ExchangeFormat::Exchange))?
            } else {
                serde_json::to_value(&records)?
            };

            match output {
                Some(dir) => {
                    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
                    seqmap_ingest::marshal::export_json(&dir.join("uniprot-records.json"), &document)?;
                    seqmap_ingest::marshal::export_json(&dir.join("uniprot-matches.json"), &matches)?;
                    client.write_xml(&dir.join("uniprot.xml"))?;
                    info!("Wrote {} records to {}", records.len(), dir.display());
                },
                None => print_json(&document)?,
            }
        },
        Command::Cache { action } => {
            let cache = CacheDir::new(&cli.cache_path);
            match action {
                CacheAction::List => {
                    for entry in cache.list_all()? {
                        println!("{:<24} {:>8} files {:>14} bytes", entry.name, entry.files, entry.size);
                    }
                    println!("total {} bytes", cache.total_size()?);
                },
                CacheAction::Clear { name: Some(name) } => {
                    if cache.remove(&name)? {
                        info!("Removed cache {}", name);
                    } else {
                        info!("No cache named {}", name);
                    }
                },
                CacheAction::Clear { name: None } => {
                    let count = cache.clear_all()?;
                    info!("Removed {} cache directories", count);
                },
            }
        },
        Command::Stash { action } => match action {
            StashAction::Backup {
                provider,
                remote,
                prefix,
            } if provider == glycan::CACHE_DIR => {
                let glycan = GlycanProvider::new(&options);
                if !glycan.to_stash(&remote, prefix.as_deref()).await {
                    bail!("Stash backup failed");
                }
            },
            StashAction::Backup {
                provider,
                remote,
                prefix,
            } => {
                let stored = backup_provider(&cli.cache_path, &provider, &remote, prefix.as_deref()).await?;
                info!("Stashed {} cache to {}", provider, stored.display());
            },
            StashAction::Restore {
                provider,
                remote,
                prefix,
            } if provider == glycan::CACHE_DIR => {
                let mut glycan = GlycanProvider::new(&options);
                if !glycan.from_stash(&fetcher, &remote, prefix.as_deref()).await {
                    bail!("Stash restore failed");
                }
                glycan.reload();
                info!("Restored {} glycan identifier sets", glycan.identifiers().len());
            },
            StashAction::Restore {
                provider,
                remote,
                prefix,
            } => {
                let count = restore_provider(&fetcher, &cli.cache_path, &provider, &remote, prefix.as_deref()).await?;
                info!("Restored {} {} cache entries", count, provider);
            },
        },
    }

    Ok(())
}
