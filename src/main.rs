use bashparse::{Parser, ParserOptions};
use clap::Parser as _;
use std::io::Read;

#[derive(clap::Parser)]
#[command(name = "bashparse")]
#[command(about = "Parse a bash script and print its syntax tree as JSON")]
#[command(version)]
struct Cli {
    /// Parse the script given on the command line
    #[arg(short = 'c')]
    script: Option<String>,

    /// Recognize extglob patterns such as @(a|b)
    #[arg(long = "extglob")]
    extglob: bool,

    /// TOML file with parser options (extglob, max_input_size, max_depth)
    #[arg(long = "config")]
    config: Option<String>,

    /// Print the tree on one line
    #[arg(long = "compact")]
    compact: bool,

    /// Script file to parse
    #[arg()]
    script_file: Option<String>,
}

fn read_options(cli: &Cli) -> Result<ParserOptions, String> {
    let mut options = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config file: {}: {}", path, e))?;
            ParserOptions::from_toml_str(&text)
                .map_err(|e| format!("Invalid config file: {}: {}", path, e))?
        }
        None => ParserOptions::default(),
    };
    options.extglob |= cli.extglob;
    Ok(options)
}

fn read_script(cli: &Cli) -> Result<String, String> {
    if let Some(s) = &cli.script {
        return Ok(s.clone());
    }
    if let Some(file) = &cli.script_file {
        return std::fs::read_to_string(file)
            .map_err(|e| format!("Cannot read script file: {}: {}", file, e));
    }
    use std::io::IsTerminal;
    if std::io::stdin().is_terminal() {
        return Err("No script provided. Use -c 'script', provide a script file, or pipe via stdin.".to_string());
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("Cannot read stdin: {}", e))?;
    Ok(buf)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let (options, script) = match read_options(&cli).and_then(|o| Ok((o, read_script(&cli)?))) {
        Ok(pair) => pair,
        Err(message) => {
            eprintln!("Error: {}", message);
            std::process::exit(2);
        }
    };

    let nodes = match Parser::with_options(&script, options).parse() {
        Ok(nodes) => nodes,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let rendered = if cli.compact {
        serde_json::to_string(&nodes)
    } else {
        serde_json::to_string_pretty(&nodes)
    };
    match rendered {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error: Cannot serialize tree: {}", e);
            std::process::exit(1);
        }
    }
}
