//! Command-line interface for the `weft` binary.

use argh::FromArgs;

/// Actor-style dataflow runtime over Redis pub/sub.
#[derive(FromArgs, Debug)]
pub struct WeftArgs {
    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Command {
    RunDataflow(RunDataflowArgs),
    RunNode(RunNodeArgs),
    DrawDataflow(DrawDataflowArgs),
}

/// Launch every node of a dataflow and supervise it until shutdown.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "run-dataflow")]
pub struct RunDataflowArgs {
    /// dataflow TOML file
    #[argh(positional)]
    pub dataflow_toml: String,

    /// print verbose logging for debugging
    #[argh(switch)]
    pub verbose: bool,
}

/// Run a single node of a dataflow (internal child entry point).
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "run-node")]
pub struct RunNodeArgs {
    /// dataflow TOML file
    #[argh(option)]
    pub dataflow_toml: String,

    /// name of the node to run
    #[argh(option)]
    pub node_name: String,

    /// broker URL to connect to
    #[argh(option)]
    pub redis_url: String,
}

/// Render one or more dataflows as a Mermaid graph.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "draw-dataflow")]
pub struct DrawDataflowArgs {
    /// dataflow TOML files (drawn into one graph)
    #[argh(positional)]
    pub dataflow_toml: Vec<String>,

    /// also render an SVG of the graph to this path (via mermaid.ink)
    #[argh(option)]
    pub svg_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_dataflow() {
        let args = WeftArgs::from_args(&["weft"], &["run-dataflow", "flow.toml", "--verbose"])
            .unwrap();
        match args.command {
            Command::RunDataflow(args) => {
                assert_eq!(args.dataflow_toml, "flow.toml");
                assert!(args.verbose);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn parses_run_node() {
        let args = WeftArgs::from_args(
            &["weft"],
            &[
                "run-node",
                "--dataflow-toml",
                "flow.toml",
                "--node-name",
                "tick",
                "--redis-url",
                "redis://localhost:6379/0",
            ],
        )
        .unwrap();
        match args.command {
            Command::RunNode(args) => {
                assert_eq!(args.node_name, "tick");
                assert_eq!(args.redis_url, "redis://localhost:6379/0");
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn run_node_requires_all_options() {
        assert!(WeftArgs::from_args(&["weft"], &["run-node", "--node-name", "tick"]).is_err());
    }

    #[test]
    fn parses_draw_dataflow_with_many_files() {
        let args = WeftArgs::from_args(
            &["weft"],
            &["draw-dataflow", "a.toml", "b.toml", "--svg-path", "graph.svg"],
        )
        .unwrap();
        match args.command {
            Command::DrawDataflow(args) => {
                assert_eq!(args.dataflow_toml, vec!["a.toml", "b.toml"]);
                assert_eq!(args.svg_path.as_deref(), Some("graph.svg"));
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
