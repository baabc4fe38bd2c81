use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use nivelacion_report::analyzer::{ClassificationSummary, RecordClassifier};
use nivelacion_report::models::{ClassifiedRecord, Config, InputRecord};
use nivelacion_report::progress::{BarProgress, NoProgress, ProgressObserver};
use nivelacion_report::{reader, writer};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Rows shown in the console previews of the input and the results
const PREVIEW_ROWS: usize = 10;

fn cli() -> Command {
    Command::new("nivelacion-report")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Classifies admission exam results into admission and leveling requirements")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Log loading and writing details"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("process")
                .about("Classify an exam results workbook")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .help("Exam results workbook (.xlsx)")
                        .required(true),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Results workbook to write")
                        .default_value("resultados_examen_admision.xlsx"),
                )
                .arg(
                    Arg::new("csv")
                        .long("csv")
                        .value_name("FILE")
                        .help("Also write the results as CSV"),
                )
                .arg(
                    Arg::new("no-progress")
                        .long("no-progress")
                        .action(ArgAction::SetTrue)
                        .help("Hide the progress bar"),
                ),
        )
        .subcommand(
            Command::new("template")
                .about("Write an empty input workbook with the expected headers")
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Template workbook to write")
                        .default_value("plantilla_examen_admision.xlsx"),
                ),
        )
        .subcommand(Command::new("init-config").about("Write the default configuration file"))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    match matches.subcommand() {
        Some(("init-config", _)) => init_config(config_file),
        Some(("template", sub)) => {
            let config = load_config(config_file)?;
            run_template(sub, &config)
        }
        Some(("process", sub)) => {
            let config = load_config(config_file)?;
            run_process(sub, &config)
        }
        Some((other, _)) => bail!("unknown command: {}", other),
        None => bail!("no command given"),
    }
}

fn load_config(config_file: &str) -> Result<Config> {
    if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
    } else {
        println!("📋 No configuration file at {}, using defaults", config_file);
        Ok(Config::default())
    }
}

fn init_config(config_file: &str) -> Result<()> {
    if Path::new(config_file).exists() {
        println!("⚠️  {} already exists, leaving it untouched", config_file);
        return Ok(());
    }
    Config::default().save_to_file(config_file)?;
    println!("📝 Created default configuration file: {}", config_file);
    Ok(())
}

fn run_template(sub: &ArgMatches, config: &Config) -> Result<()> {
    let output = sub
        .get_one::<String>("output")
        .context("missing --output")?;

    writer::write_template(Path::new(output), config)
        .with_context(|| format!("Failed to write template: {}", output))?;
    println!("📥 Template written to: {}", output);
    Ok(())
}

fn run_process(sub: &ArgMatches, config: &Config) -> Result<()> {
    let input = sub.get_one::<String>("input").context("missing --input")?;
    let output = sub
        .get_one::<String>("output")
        .context("missing --output")?;

    println!("🔍 Processing admission results: {}", input);
    println!("🗓️  Term: {}", config.term_label);

    let records = reader::read_input_path(Path::new(input), config.input_sheet.as_deref())
        .with_context(|| format!("Could not read exam workbook: {}", input))?;
    println!("   ✅ Found {} student rows", records.len());
    print_input_preview(&records);

    let classifier = RecordClassifier::new(config);
    let mut silent = NoProgress;
    let mut bar;
    let observer: &mut dyn ProgressObserver = if sub.get_flag("no-progress") {
        &mut silent
    } else {
        bar = BarProgress::new("Procesando");
        &mut bar
    };
    let classified = classifier.classify_all(&records, observer);

    print_preview(&classified);

    writer::write_report(Path::new(output), &classified, config)
        .with_context(|| format!("Failed to write results: {}", output))?;
    println!("\n📄 Results written to: {}", output);

    if let Some(csv_path) = sub.get_one::<String>("csv") {
        writer::write_csv(Path::new(csv_path), &classified)
            .with_context(|| format!("Failed to write CSV: {}", csv_path))?;
        println!("📄 CSV copy written to: {}", csv_path);
    }

    print_summary(&classifier.summarize(&classified));

    println!("\n✅ Processing complete!");
    Ok(())
}

fn input_preview_lines(records: &[InputRecord]) -> Vec<String> {
    let mut lines = vec![format!(
        "   {:<12} {:<22} {:<18} {:<24} {:<11} {:>6} {:>6} {:>6} {:>6} {:>6}",
        "codigo", "apellidos", "nombres", "programa", "asistencia", "com%", "hab%", "mat%", "cien%", "total%"
    )];
    for record in records.iter().take(PREVIEW_ROWS) {
        lines.push(format!(
            "   {:<12.12} {:<22.22} {:<18.18} {:<24.24} {:<11.11} {:>6.6} {:>6.6} {:>6.6} {:>6.6} {:>6.6}",
            record.student_code.to_string(),
            record.last_names.to_string(),
            record.first_names.to_string(),
            record.program.to_string(),
            record.attendance.to_string(),
            record.communication_pct.to_string(),
            record.communicative_skills_pct.to_string(),
            record.mathematics_pct.to_string(),
            record.science_pct.to_string(),
            record.total_pct.to_string()
        ));
    }
    lines
}

fn print_input_preview(records: &[InputRecord]) {
    if records.is_empty() {
        return;
    }

    println!("\n📋 Input preview (first {} rows):", PREVIEW_ROWS.min(records.len()));
    for line in input_preview_lines(records) {
        println!("{}", line);
    }
}

fn print_preview(records: &[ClassifiedRecord]) {
    if records.is_empty() {
        return;
    }

    println!("\n👀 Results preview (first {} rows):", PREVIEW_ROWS.min(records.len()));
    println!(
        "   {:>4}  {:<22} {:<18} {:<24} {:<11} {:<11} {:<3} {}",
        "id", "apellidos", "nombres", "programa", "asistio", "condicion", "niv", "areas"
    );
    for record in records.iter().take(PREVIEW_ROWS) {
        let areas: Vec<&str> = record.leveling_areas.iter().map(|a| a.tag()).collect();
        println!(
            "   {:>4}  {:<22.22} {:<18.18} {:<24.24} {:<11} {:<11} {:<3} {}",
            record.id,
            record.last_names.to_string(),
            record.first_names.to_string(),
            record.program.to_string(),
            record.attendance.to_string(),
            record.condition.to_string(),
            record.requires_leveling().to_string(),
            areas.join(" | ")
        );
    }
}

fn print_summary(summary: &ClassificationSummary) {
    println!("\n📊 SUMMARY");
    println!("==========\n");

    println!("   Students processed: {}", summary.total);
    println!("   Attended: {}   Absent: {}", summary.attended, summary.absent);
    println!("   🎓 Admitted: {}", summary.admitted);
    println!("   📚 Requiring leveling: {}", summary.requiring_leveling);

    if !summary.area_counts.is_empty() {
        println!("\n📚 Leveling by area:");
        for (area, count) in &summary.area_counts {
            println!("   - {}: {}", area, count);
        }
    }
}
