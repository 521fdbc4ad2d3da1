use anyhow::{bail, Context};

const USAGE: &str = "\
Usage: prooftoys [OPTIONS] [FILE]

Reads one term per line from FILE, or from standard input, and prints each
term with its inferred type. Lines starting with `#` are skipped.

Options:
  -h, --help     Print this help
  -v, --version  Print version
";

fn main() -> anyhow::Result<()> {
    prooftoys::logger::init(prooftoys::logger::level_from_env());

    let mut file = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print!("{USAGE}");
                return Ok(());
            }
            "-v" | "--version" => {
                println!("prooftoys {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "-" => file = None,
            _ if arg.starts_with('-') => bail!("unknown option `{arg}`"),
            _ => {
                if file.is_some() {
                    bail!("more than one input file given");
                }
                file = Some(arg);
            }
        }
    }

    let input = match &file {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read `{path}`"))?
        }
        None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin")?,
    };
    for line in prooftoys::process(&input)? {
        println!("{line}");
    }
    Ok(())
}
