use clap::Parser;
use roll_explorer::app::display;
use roll_explorer::config::{parse_filter, Command, ExportArgs, RollArgs};
use roll_explorer::core::export::Exporter;
use roll_explorer::core::{CatalogSource, DocumentSource};
use roll_explorer::utils::error::ErrorSeverity;
use roll_explorer::utils::{logger, validation::Validate};
use roll_explorer::{
    CliConfig, CodeSelection, ExplorerError, HttpCatalogSource, HttpDocumentSource, LocalStorage,
    Result, RollExplorer, TerritoryDirectory, TomlConfig,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting roll-explorer");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證配置
    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            std::process::exit(report_error(&e));
        }
    };

    if let Err(e) = run(&cli, &settings).await {
        let exit_code = report_error(&e);
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}

fn load_settings(cli: &CliConfig) -> Result<TomlConfig> {
    cli.validate()?;

    let settings = match &cli.config {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            TomlConfig::from_file(path)?
        }
        None => TomlConfig::default(),
    };
    settings.validate()?;
    Ok(settings)
}

/// Renders an error for the user and maps its severity to an exit code.
fn report_error(e: &ExplorerError) -> i32 {
    if e.severity() == ErrorSeverity::Low {
        tracing::warn!("⚠️ {}", e);
        eprintln!("⚠️ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());
        return 0;
    }

    tracing::error!(
        "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

async fn run(cli: &CliConfig, settings: &TomlConfig) -> Result<()> {
    let mut source = HttpCatalogSource::new(
        settings.catalog.endpoint.clone(),
        settings.catalog.resource_id.clone(),
    );
    if let Some(timeout) = settings.catalog_timeout() {
        source = source.with_timeout(timeout);
    }
    let directory = TerritoryDirectory::new(source, settings.directory_options());
    let documents = HttpDocumentSource::new(settings.document_timeout());
    let mut explorer = RollExplorer::new(directory, documents, settings.extractor()?);

    match &cli.command {
        Command::Territories { filter } => {
            let filter = parse_filter(filter.as_deref())?;
            // 目錄載入失敗時仍顯示空表，再回報錯誤
            let (listing, failure) =
                display::territories_listing(explorer.territories(filter.as_ref()).await);
            print!("{}", listing);
            if let Some(e) = failure {
                return Err(e);
            }
        }
        Command::Codes { roll } => {
            open_roll(&mut explorer, roll).await?;
            let report = explorer.session().summarize_selection(&CodeSelection::All)?;
            for group in &report.groups {
                println!("{:<10} {:>8} units", group.code, group.unit_count);
            }
            println!("{} codes", report.groups.len());
        }
        Command::Summarize {
            roll,
            selection,
            export,
        } => {
            open_roll(&mut explorer, roll).await?;
            let selection = selection.selection();
            let report = explorer.session().summarize_selection(&selection)?;
            print!("{}", display::summary_table(&report));

            if let Some(exporter) = exporter(export, settings)? {
                let written = explorer.export_summary(&exporter, &selection).await?;
                report_written(&written);
            }
        }
        Command::Units {
            roll,
            selection,
            export,
            limit,
        } => {
            open_roll(&mut explorer, roll).await?;
            let selection = selection.selection();
            let units = explorer.session().units_selection(&selection)?;
            print!("{}", display::units_table(&units, *limit));
            println!("{} units", units.len());

            if let Some(exporter) = exporter(export, settings)? {
                let written = explorer.export_units(&exporter, &selection).await?;
                report_written(&written);
            }
        }
    }

    Ok(())
}

async fn open_roll<C: CatalogSource, D: DocumentSource>(
    explorer: &mut RollExplorer<C, D>,
    roll: &RollArgs,
) -> Result<()> {
    let filter = parse_filter(roll.filter.as_deref())?;
    let loaded = match (&roll.file, &roll.territory) {
        (Some(path), _) => explorer.open_file(path).await?,
        (None, Some(name)) => explorer.open_territory(name, filter.as_ref()).await?,
        (None, None) => {
            return Err(ExplorerError::ConfigError {
                message: "either --territory or --file is required".to_string(),
            })
        }
    };
    println!("{}", display::roll_header(loaded));
    Ok(())
}

fn exporter(args: &ExportArgs, settings: &TomlConfig) -> Result<Option<Exporter<LocalStorage>>> {
    let Some(dir) = &args.export else {
        return Ok(None);
    };
    let format = args.format_or(settings.export.format)?;
    Ok(Some(Exporter::new(
        LocalStorage::new(dir.clone()),
        format,
        args.bundle || settings.export.bundle,
    )))
}

fn report_written(paths: &[String]) {
    for path in paths {
        tracing::info!("📁 Exported {}", path);
        println!("📁 Exported {}", path);
    }
}
