use std::fs;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use truth_and_crop_rs::{
    ClassLabel, ClickMode, Config, CropFailureKind, ExportReport, LabelingSession, SessionParams,
    SlicEngine,
};

#[derive(Debug, Clone, Copy)]
enum Command {
    Class(ClassLabel),
    Label {
        x: u32,
        y: u32,
        class: Option<ClassLabel>,
    },
    Crop {
        x: u32,
        y: u32,
    },
    Commit,
}

fn main() -> Result<()> {
    let config = Config::parse();

    ensure!(config.input.exists(), "Input image does not exist");

    let params = SessionParams::from(&config);
    let mut session = LabelingSession::new(
        SlicEngine::new(),
        params,
        &config.output_dir,
        config.image_format(),
    )?;
    session
        .load_image(&config.input)
        .with_context(|| format!("Failed to load image: {}", config.input.display()))?;

    match config.script.as_deref() {
        Some(script) => replay_script(&mut session, script),
        None => {
            // スクリプトなしなら分割だけ実行して統計を出す
            let map = session.superpixels()?;
            let mut ids: Vec<u32> = map.iter().copied().collect();
            ids.sort_unstable();
            ids.dedup();
            let (width, height) = session.dimensions().unwrap_or((0, 0));
            println!(
                "{}: {}x{} -> {} superpixels",
                config.input.display(),
                width,
                height,
                ids.len()
            );
            Ok(())
        }
    }
}

fn replay_script(session: &mut LabelingSession<SlicEngine>, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script: {}", path.display()))?;
    let commands = text
        .lines()
        .enumerate()
        .map(|(number, line)| {
            parse_line(line).with_context(|| format!("{}:{}", path.display(), number + 1))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

    let progress_bar = ProgressBar::new(commands.len() as u64);
    progress_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
        )?
        .progress_chars("#>-"),
    );

    for command in commands {
        match command {
            Command::Class(label) => session.set_active_class(label),
            Command::Label { x, y, class } => {
                if let Some(label) = class {
                    session.set_active_class(label);
                }
                session.on_click(x, y, ClickMode::Label)?;
            }
            Command::Crop { x, y } => {
                session.on_click(x, y, ClickMode::Crop)?;
            }
            Command::Commit => {
                // コミット直前のクラス比率を表示してから書き出す
                print_balance(session);
                let report = session.commit()?;
                print_report(&report, session.params().half_window);
            }
        }
        progress_bar.inc(1);
    }
    progress_bar.finish();

    Ok(())
}

fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let command = match tokens.as_slice() {
        ["class", class] => Command::Class(parse_class(class)?),
        ["label", x, y] => Command::Label {
            x: parse_coord(x)?,
            y: parse_coord(y)?,
            class: None,
        },
        ["label", x, y, class] => Command::Label {
            x: parse_coord(x)?,
            y: parse_coord(y)?,
            class: Some(parse_class(class)?),
        },
        ["crop", x, y] => Command::Crop {
            x: parse_coord(x)?,
            y: parse_coord(y)?,
        },
        ["commit"] => Command::Commit,
        _ => bail!("Unrecognized command: {line}"),
    };
    Ok(Some(command))
}

fn parse_coord(token: &str) -> Result<u32> {
    token
        .parse::<u32>()
        .with_context(|| format!("Invalid coordinate: {token}"))
}

fn parse_class(token: &str) -> Result<ClassLabel> {
    ClassLabel::parse(token).with_context(|| format!("Unknown class: {token}"))
}

fn print_report(report: &ExportReport, half_window: u32) {
    for success in &report.written {
        println!(
            "Success: cropped image at x={},y={} with wnd={}",
            success.x, success.y, half_window
        );
    }
    for failure in &report.failures {
        match &failure.kind {
            CropFailureKind::OutOfBounds { half_window } => eprintln!(
                "Error: exceeded image dimensions, could not crop at x={},y={} with wnd={}",
                failure.x, failure.y, half_window
            ),
            CropFailureKind::Write { tree, path, source } => eprintln!(
                "Error: failed to write {} ({}): {}",
                path.display(),
                tree,
                source
            ),
        }
    }
}

fn print_balance(session: &LabelingSession<SlicEngine>) {
    let percentages = session.percentages();
    println!("labeled superpixels: {}", session.labeled_total());
    for (label, percentage) in ClassLabel::ALL.into_iter().zip(percentages) {
        println!("{:>6}: {:>3}%", label.name(), percentage);
    }
}
