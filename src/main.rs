mod config;
mod error;
mod extract;
mod fetch;
mod google;
mod mhlw;
mod ocr;
mod patients;
mod pipeline;
mod prefecture;
mod server;
mod sheets;
#[cfg(test)]
mod stub_site;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::patients::{PatientUpdate, WriteMode};
use crate::pipeline::{ExtractOptions, Services};

#[derive(Parser)]
#[command(name = "mhlw_sync", about = "Sync MHLW COVID-19 reports and prefecture counts into the tracking spreadsheet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the URL of the latest daily report
    ReportUrl {
        #[arg(long)]
        index_url: Option<String>,
    },
    /// Extract the numbers from a daily report
    Extract {
        /// Use this report instead of the latest one
        #[arg(long)]
        report_url: Option<String>,
        #[arg(long)]
        index_url: Option<String>,
        /// Skip the per-prefecture PDF table
        #[arg(long)]
        no_recoveries: bool,
        /// OCR the national summary image
        #[arg(long)]
        summary: bool,
        /// Print values one per line for pasting into the sheet
        #[arg(long)]
        output_text: bool,
        /// Save the cropped OCR regions into this directory
        #[arg(long)]
        output_images: Option<PathBuf>,
        /// Write the values to the spreadsheet
        #[arg(long)]
        write: bool,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Reconcile one prefecture's count for a day into the patient sheet
    Patients {
        /// English prefecture name, e.g. Tokyo
        prefecture: String,
        #[arg(long)]
        cases: Option<u64>,
        #[arg(long)]
        deaths: Option<u64>,
        /// YYYY-MM-DD (default: today in JST)
        #[arg(long)]
        date: Option<String>,
        /// Use yesterday's date in JST
        #[arg(long, conflicts_with = "date")]
        yesterday: bool,
        #[arg(long, default_value = "")]
        source: String,
        /// Append without looking for an existing row
        #[arg(long)]
        append: bool,
        /// Append one numbered row per patient instead of a Count row
        #[arg(long)]
        no_count_column: bool,
    },
    /// Count airport quarantine cases in the latest port report
    PortCases {
        #[arg(long)]
        index_url: Option<String>,
        /// Reconcile the count into the patient sheet
        #[arg(long)]
        write: bool,
    },
    /// Run the HTTP trigger service
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;

    let result = match cli.command {
        Commands::ReportUrl { index_url } => {
            let services = Services::from_settings(settings)?;
            let index_url = index_url.unwrap_or_else(|| services.settings.index_url.clone());
            match mhlw::latest_report_url(&services.fetcher, &index_url).await? {
                Some(url) => println!("{}", url),
                None => println!("No report found on {}", index_url),
            }
            Ok(())
        }
        Commands::Extract {
            report_url,
            index_url,
            no_recoveries,
            summary,
            output_text,
            output_images,
            write,
            verbose,
        } => {
            let services = Services::from_settings(settings)?;
            let opts = ExtractOptions {
                report_url,
                index_url: index_url.unwrap_or_else(|| services.settings.index_url.clone()),
                extract_recoveries: !no_recoveries,
                extract_summary: summary,
                write,
                verbose,
                dump_dir: output_images.or_else(|| services.settings.image_dump_dir.clone()),
            };
            let outcome = pipeline::report_today(&services, &opts).await?;
            if output_text {
                print!("{}", pipeline::format_output_text(&outcome.values));
            } else {
                println!("{}", outcome);
            }
            Ok(())
        }
        Commands::Patients {
            prefecture,
            cases,
            deaths,
            date,
            yesterday,
            source,
            append,
            no_count_column,
        } => {
            let services = Services::from_settings(settings)?;
            let date = match (date, yesterday) {
                (Some(d), _) => d,
                (None, true) => pipeline::yesterday_jst(),
                (None, false) => pipeline::today_jst(),
            };
            let update = PatientUpdate {
                prefecture,
                date,
                cases,
                deceased: deaths,
                source: fetch::strip_query(&source),
            };
            let mode = WriteMode {
                update: !append,
                use_count_column: !no_count_column,
            };
            let rows = patients::write_patients(services.sheets()?, &update, mode).await?;
            println!("Updated {} rows for {} on {}", rows, update.prefecture, update.date);
            Ok(())
        }
        Commands::PortCases { index_url, write } => {
            let services = Services::from_settings(settings)?;
            let index_url = index_url.unwrap_or_else(|| services.settings.index_url.clone());
            let outcome = pipeline::port_cases(&services, &index_url, write).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| settings.host.clone());
            let port = port.unwrap_or(settings.port);
            let services = Services::from_settings(settings)?;
            server::serve(services, &host, port).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
