use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, Parser};
use serde_json::Value;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[cfg(feature = "server")]
use flowcanvas::serve::{ServeArgs, run_serve};
use flowcanvas::{
    CanvasState, EditorConfig, NormalizedDiagram, Theme, generate_canvas, normalize_text,
    render_svg,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "flowcanvas generate",
    about = "Turn an AI diagram response into a laid-out canvas snapshot."
)]
pub struct GenerateArgs {
    /// Response to normalize (JSON or free text). Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Where to write the canvas snapshot. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Width the top level of the tree is spread across.
    #[arg(long = "canvas-width")]
    canvas_width: Option<f64>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "flowcanvas",
    about = "Render canvas snapshots or AI diagram responses to SVG."
)]
pub struct RenderArgs {
    /// Canvas snapshot or AI response to render. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Render with the dark theme.
    #[arg(long = "dark", action = ArgAction::SetTrue)]
    dark: bool,

    /// Background color (defaults to the theme background).
    #[arg(short = 'b', long = "background-color")]
    background_color: Option<String>,

    /// Layout width used when the input is an AI response.
    #[arg(long = "canvas-width")]
    canvas_width: Option<f64>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

fn editor_config(canvas_width: Option<f64>, dark: bool) -> EditorConfig {
    let mut config = EditorConfig::default();
    if let Some(width) = canvas_width {
        config.layout.canvas_width = width;
    }
    if dark {
        config.dark_mode = true;
    }
    config
}

fn run_generate(cli: GenerateArgs) -> Result<()> {
    let config = editor_config(cli.canvas_width, false);
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref(), &input_source, "canvas.json")?;

    let response = load_input(&input_source)?;
    let diagram = normalize_text(&response);
    report_fallback(&diagram);

    let canvas = generate_canvas(&diagram, &config.layout);
    let json = canvas.to_json().context("failed to encode canvas snapshot")?;

    write_output(output_dest, json.as_bytes(), "Generated canvas", cli.quiet)
}

fn run_render(cli: RenderArgs) -> Result<()> {
    let config = editor_config(cli.canvas_width, cli.dark);
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref(), &input_source, "svg")?;

    let contents = load_input(&input_source)?;
    let canvas = match parse_snapshot(&contents)? {
        Some(canvas) => canvas,
        None => {
            let diagram = normalize_text(&contents);
            report_fallback(&diagram);
            generate_canvas(&diagram, &config.layout)
        }
    };

    let theme = Theme::for_mode(config.dark_mode);
    let svg = render_svg(&canvas, &theme, cli.background_color.as_deref())?;

    write_output(output_dest, svg.as_bytes(), "Rendered diagram", cli.quiet)
}

/// Reads the input as a canvas snapshot when it looks like one. Anything
/// else is treated as an AI response.
fn parse_snapshot(contents: &str) -> Result<Option<CanvasState>> {
    let Ok(value) = serde_json::from_str::<Value>(contents.trim()) else {
        return Ok(None);
    };
    if value.get("elements").is_none_or(|elements| !elements.is_array()) {
        return Ok(None);
    }

    let canvas: CanvasState =
        serde_json::from_value(value).context("input looks like a canvas snapshot but is invalid")?;
    canvas.validate()?;
    Ok(Some(canvas))
}

fn report_fallback(diagram: &NormalizedDiagram) {
    if let Some(notice) = diagram.notice() {
        eprintln!("note: {notice}");
    }
}

pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            #[cfg(feature = "server")]
            {
                let serve_args = ServeArgs::parse_from(
                    std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
                );
                run_serve(serve_args).await
            }
            #[cfg(not(feature = "server"))]
            {
                Err(anyhow!(
                    "'serve' command requires the 'server' feature to be enabled"
                ))
            }
        }
        Some("generate") => {
            let generate_args = GenerateArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_generate(generate_args)
        }
        Some("render") => {
            let render_args = RenderArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_render(render_args)
        }
        _ => {
            let render_args = RenderArgs::parse_from(args);
            run_render(render_args)
        }
    }
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(
    output: Option<&str>,
    input: &InputSource,
    extension: &str,
) -> Result<OutputDestination> {
    match output {
        Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
        None => match input {
            InputSource::File(path) => {
                let default_name = path
                    .file_stem()
                    .and_then(|name| name.to_str())
                    .map(|name| format!("{name}.{extension}"))
                    .unwrap_or_else(|| format!("out.{extension}"));
                let mut default_path = path.to_path_buf();
                default_path.set_file_name(default_name);
                Ok(OutputDestination::File(default_path))
            }
            InputSource::Stdin => Ok(OutputDestination::Stdout),
        },
    }
}

fn load_input(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no input supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], action: &str, quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("{action} -> {}", path.display());
            }
        }
    }
    Ok(())
}
