use analysis::analyses::immediate_dominators;
use analysis::cfg::ControlFlowGraph;
use clap::Parser as CommandLineParser;
use dex_lib::{
    cfg::Cfg,
    ir::{self, Method},
    lexer::Lexer,
    parser::Parser,
};
use utils::DiagnosticEmitter;

#[derive(Debug, CommandLineParser, Default)]
#[command(
    name = "dex",
    version,
    about = "Build and analyze the control flow graphs of dex-style method streams."
)]
pub struct Opt {
    /// Dump the control flow graph of every method in graphviz format.
    #[arg(long)]
    pub dump_cfg: bool,

    /// Print the immediate dominator of every basic block.
    #[arg(long)]
    pub dominators: bool,

    /// Round-trip every method through its graph and print the
    /// re-linearized unit.
    #[arg(long)]
    pub linearize: bool,

    /// File containing the textual form of the methods.
    pub filename: String,
}

pub fn process_source(src: &str, diag: &mut DiagnosticEmitter, opts: &Opt) -> Option<()> {
    let lexer = Lexer::new(src, diag);
    let tokens = lexer.lex_all();
    if tokens.tokens.is_empty() {
        return None;
    }
    let parser = Parser::new(tokens, diag);
    let mut unit = parser.parse()?;

    if opts.dump_cfg {
        for method in &unit.methods {
            let cfg = Cfg::new(method.entries.clone());
            let name = unit.identifiers.get_name(method.name).to_owned();
            diag.out_ln(&dex_lib::cfg::print(&name, &cfg, &unit));
        }
    }

    if opts.dominators {
        for method in &unit.methods {
            let cfg = Cfg::new(method.entries.clone());
            diag.out_ln(&format!(
                "{}:",
                unit.identifiers.get_name(method.name)
            ));
            let idoms = immediate_dominators(&cfg);
            for block in cfg.blocks() {
                let Some(info) = idoms.get(&block)
                else {
                    continue;
                };
                diag.out_ln(&format!("  B{block}: idom B{}", info.dom));
            }
        }
    }

    if opts.linearize {
        let methods = std::mem::take(&mut unit.methods);
        unit.methods = methods
            .into_iter()
            .map(|method| {
                let cfg = Cfg::new(method.entries);
                Method {
                    name: method.name,
                    entries: cfg.linearize(&mut unit.identifiers),
                }
            })
            .collect();
        diag.out(&ir::print(&unit));
    }

    if !opts.dump_cfg && !opts.dominators && !opts.linearize {
        diag.out(&ir::print(&unit));
    }

    Some(())
}
