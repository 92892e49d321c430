// CLI application for manually inspecting the structured output of a
// hand-written CFG during development. Not part of the crate's contract
// (see SPEC_FULL.md section 6).
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ctrlstruct::ast::arena::{ArenaAstContext, Stmt};
use ctrlstruct::{AstContext, Cfg, StructurizerConfig};

#[derive(Parser)]
#[command(name = "ctrlstruct")]
#[command(about = "Structures a hand-written control-flow graph and prints the result")]
#[command(version)]
struct Cli {
    /// Path to a CFG description file (see `--format` below)
    #[arg(short, long)]
    input: PathBuf,

    /// Print the SESE-normalized, region-analyzed CFG's block count instead
    /// of the final statement tree
    #[arg(long)]
    stats_only: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let (mut cfg, mut ctx) = parse_cfg(&source)?;

    let config = StructurizerConfig::default();
    let body = ctrlstruct::structurize_function(&mut cfg, &mut ctx, &config)
        .context("structurizing function")?;

    if cli.stats_only {
        println!("blocks: {}", cfg.block_count());
    } else {
        print_stmt(&ctx, body, 0);
    }

    Ok(())
}

type Ctx = ArenaAstContext<String, String, u64>;

/// Parses a line-oriented edge list: each line is either `A -> B` (an
/// unconditional edge) or `A -> B : cond` (labelled with an atomic leaf
/// condition, taken verbatim as the leaf's display text). The first block
/// named is the function entry. Blank lines and lines starting with `#` are
/// ignored.
fn parse_cfg(source: &str) -> Result<(Cfg, Ctx)> {
    let (mut cfg, entry) = Cfg::new();
    let mut ctx: Ctx = ArenaAstContext::new();
    let mut names: Vec<String> = Vec::new();
    let block_of = |name: &str, cfg: &mut Cfg, names: &mut Vec<String>| -> ctrlstruct::BlockId {
        if let Some(pos) = names.iter().position(|n| n == name) {
            ctrlstruct::BlockId(pos as u32)
        } else {
            let id = if names.is_empty() {
                entry
            } else {
                cfg.create_block()
            };
            names.push(name.to_string());
            id
        }
    };

    for (lineno, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (edge_part, cond) = match line.split_once(':') {
            Some((lhs, rhs)) => (lhs.trim(), Some(rhs.trim().to_string())),
            None => (line, None),
        };
        let Some((from_name, to_name)) = edge_part.split_once("->") else {
            bail!("line {}: expected `A -> B` or `A -> B : cond`, got {:?}", lineno + 1, raw);
        };
        let from = block_of(from_name.trim(), &mut cfg, &mut names);
        let to = block_of(to_name.trim(), &mut cfg, &mut names);
        let condition = match cond {
            Some(text) => ctx.leaf(text),
            None => ctx.expr_true(),
        };
        cfg.create_edge(from, to, condition);
    }

    for name in &names {
        let id = ctrlstruct::BlockId(names.iter().position(|n| n == name).unwrap() as u32);
        if cfg.block(id).statement.is_none() {
            cfg.block_mut(id).statement = Some(ctx.block_stmt(name.clone()));
        }
    }

    Ok((cfg, ctx))
}

fn print_stmt(ctx: &Ctx, id: ctrlstruct::StmtId, depth: usize) {
    let pad = "  ".repeat(depth);
    match ctx.stmt(id) {
        Stmt::Sequence(items) => {
            println!("{pad}seq {{");
            for &item in items {
                print_stmt(ctx, item, depth + 1);
            }
            println!("{pad}}}");
        }
        Stmt::IfElse { cond, then_branch } => {
            println!("{pad}if {:?} {{", ctx.expr(*cond));
            print_stmt(ctx, *then_branch, depth + 1);
            println!("{pad}}}");
        }
        Stmt::Loop { kind, body, .. } => {
            println!("{pad}loop ({kind:?}) {{");
            print_stmt(ctx, *body, depth + 1);
            println!("{pad}}}");
        }
        Stmt::Break { cond } => println!("{pad}if {:?} break;", ctx.expr(*cond)),
        Stmt::Assign { var, val } => println!("{pad}{var:?} := {val}"),
        Stmt::Block(name) => println!("{pad}{name}"),
    }
}
