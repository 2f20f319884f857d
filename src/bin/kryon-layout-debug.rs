use anyhow::{Context, Result};
use clap::Parser;
use kryon_layout::{Layer, Scene};
use serde_json::json;
use std::fs;
use std::path::Path;

#[derive(Parser)]
#[command(name = "kryon-layout-debug")]
#[command(about = "Resolves a constraint scene and prints the geometry of every element")]
struct Args {
    /// Path to the scene description (.json)
    scene_file: String,

    /// Viewport size to resolve at, as WIDTHxHEIGHT; repeat to replay a resize sequence
    #[arg(long = "size", value_parser = parse_size)]
    sizes: Vec<(f64, f64)>,

    /// Output format (tree, json)
    #[arg(long, default_value = "tree")]
    format: String,

    /// Save output to file instead of stdout
    #[arg(long)]
    output: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_size(value: &str) -> std::result::Result<(f64, f64), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", value))?;
    let width: f64 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width '{}'", width))?;
    let height: f64 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height '{}'", height))?;
    Ok((width, height))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    if !Path::new(&args.scene_file).exists() {
        anyhow::bail!("Scene file not found: {}", args.scene_file);
    }

    let scene = Scene::load(&args.scene_file).context("Failed to load scene")?;
    let (mut layer, _) = scene.build().context("Failed to build scene")?;

    let mut frames = vec![describe(&layer)?];
    for &(width, height) in &args.sizes {
        layer
            .set_size(width, height)
            .with_context(|| format!("Failed to resize layer to {}x{}", width, height))?;
        frames.push(describe(&layer)?);
    }

    let output_text = match args.format.as_str() {
        "tree" => generate_tree_output(&frames),
        "json" => generate_json_output(&frames)?,
        other => anyhow::bail!("Unknown format: {}. Use 'tree' or 'json'", other),
    };

    if let Some(output_file) = args.output {
        fs::write(&output_file, output_text)
            .with_context(|| format!("Failed to write to file: {}", output_file))?;
        eprintln!("Output written to: {}", output_file);
    } else {
        print!("{}", output_text);
    }

    Ok(())
}

struct Frame {
    size: (f64, f64),
    orientation: String,
    derivations: u64,
    elements: Vec<(String, [f32; 4])>,
}

fn describe(layer: &Layer) -> Result<Frame> {
    let mut elements = Vec::new();
    for (id, element) in layer.elements() {
        let rect = layer
            .rect(id)
            .with_context(|| format!("Failed to read geometry of {}", element.name()))?;
        elements.push((
            element.name().to_string(),
            [rect.position.x, rect.position.y, rect.size.x, rect.size.y],
        ));
    }
    Ok(Frame {
        size: layer.size(),
        orientation: layer.orientation().to_string(),
        derivations: layer.derivations(),
        elements,
    })
}

fn generate_tree_output(frames: &[Frame]) -> String {
    let mut output = String::new();
    for frame in frames {
        output.push_str(&format!(
            "layer {}x{} ({})\n",
            frame.size.0, frame.size.1, frame.orientation
        ));
        for (i, (name, [x, y, width, height])) in frame.elements.iter().enumerate() {
            let tree_char = if i + 1 == frame.elements.len() {
                "└── "
            } else {
                "├── "
            };
            output.push_str(&format!(
                "{}{} pos:({:.1},{:.1}) size:({:.1},{:.1})\n",
                tree_char, name, x, y, width, height
            ));
        }
    }
    output
}

fn generate_json_output(frames: &[Frame]) -> Result<String> {
    let frames: Vec<_> = frames
        .iter()
        .map(|frame| {
            let elements: Vec<_> = frame
                .elements
                .iter()
                .map(|(name, [x, y, width, height])| {
                    json!({
                        "name": name,
                        "position": [x, y],
                        "size": [width, height],
                    })
                })
                .collect();
            json!({
                "width": frame.size.0,
                "height": frame.size.1,
                "orientation": frame.orientation,
                "derivations": frame.derivations,
                "elements": elements,
            })
        })
        .collect();

    let mut text = serde_json::to_string_pretty(&frames).context("Failed to serialize layout")?;
    text.push('\n');
    Ok(text)
}
