mod scene;
mod session;

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use crossterm::style::Stylize;
use isp_core::firmware::MAX_CONTEXTS;

use session::{Session, SessionConfig};

const USAGE: &str = "Usage: isp-emulator [--brightness <0-255>] [--frames <n>] [--contexts <1-4>] \
                     [--script <file>] [--transcript <file>]";

#[derive(Debug, Default)]
struct Options {
    session: SessionConfig,
    /// Frames run before the first command.
    frames: u32,
    script: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    if let Err(err) = run(&options) {
        eprintln!("{}", format!("emulator failed: {err}").red());
        process::exit(1);
    }
}

fn run(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::new(&options.session)?;
    if options.frames > 0 {
        if let Some(sample) = session.run_frames(options.frames)? {
            log::info!("warm-up done: {sample}");
        }
    }

    let stdout = io::stdout();
    let mut writer = stdout.lock();

    if let Some(path) = &options.script {
        let script = fs::read_to_string(path)?;
        for line in script.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            writeln!(writer, "{} {line}", ">".dark_grey())?;
            print_lines(&mut writer, &session.handle_line(line)?)?;
        }
        log::info!("{}", session.summary());
        return Ok(());
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();
    writeln!(
        writer,
        "ISP emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        if reader.read_line(&mut line)? == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        print_lines(&mut writer, &session.handle_line(trimmed)?)?;
    }

    log::info!("{}", session.summary());
    Ok(())
}

fn print_lines<W: Write>(writer: &mut W, lines: &[String]) -> io::Result<()> {
    for line in lines {
        if line.starts_with("ERR ") {
            writeln!(writer, "{}", line.as_str().red())?;
        } else {
            writeln!(writer, "{line}")?;
        }
    }
    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options<I>(args: I) -> Result<Options, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--brightness" => options.session.brightness = parse_number(&value()?, "brightness")?,
            "--frames" => options.frames = parse_number(&value()?, "frames")?,
            "--contexts" => {
                let contexts: usize = parse_number(&value()?, "contexts")?;
                if !(1..=MAX_CONTEXTS).contains(&contexts) {
                    return Err(format!("contexts must be 1..={MAX_CONTEXTS}"));
                }
                options.session.contexts = contexts;
            }
            "--script" => options.script = Some(PathBuf::from(value()?)),
            "--transcript" => options.session.transcript = Some(PathBuf::from(value()?)),
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }
    Ok(options)
}

fn parse_number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T, String> {
    text.parse()
        .map_err(|_| format!("Invalid {what} `{text}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        let options = parse(&[]).expect("valid");
        assert_eq!(options.frames, 0);
        assert_eq!(options.session.contexts, 1);
        assert!(options.script.is_none());
    }

    #[test]
    fn flags_take_separate_or_inline_values() {
        let options = parse(&["--brightness", "30", "--frames=12", "--script", "demo.txt"])
            .expect("valid");
        assert_eq!(options.session.brightness, 30);
        assert_eq!(options.frames, 12);
        assert_eq!(options.script, Some(PathBuf::from("demo.txt")));
    }

    #[test]
    fn bad_arguments_are_reported() {
        assert!(parse(&["--brightness", "300"]).is_err());
        assert!(parse(&["--contexts", "9"]).is_err());
        assert!(parse(&["--frames"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
    }
}
