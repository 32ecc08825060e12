//! hdfmesh CLI - inspect mesh containers.

use std::env;
use std::process;

use hdfmesh::container::{Group, Node};
use hdfmesh::core::schema::{ROOT_GROUP, STEPS_GROUP};
use hdfmesh::prelude::*;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Counts summarised by `info`.
#[derive(Debug, Default)]
struct Counts {
    points: usize,
    cells: usize,
    blocks: usize,
    parts: usize,
}

impl Counts {
    fn add(&mut self, obj: &DataObject) {
        match obj {
            DataObject::Unstructured(m) => {
                self.points += m.num_points();
                self.cells += m.num_cells();
                self.parts += 1;
            }
            DataObject::Poly(m) => {
                self.points += m.num_points();
                self.cells += m.num_cells();
                self.parts += 1;
            }
            DataObject::Image(img) => {
                self.points += img.num_points();
                self.cells += img.num_cells();
                self.parts += 1;
            }
            DataObject::Amr(amr) => {
                for b in amr.levels.iter().flat_map(|l| &l.blocks) {
                    self.points += b.amr_box.num_points();
                    self.cells += b.amr_box.num_cells();
                    self.blocks += 1;
                }
                self.parts += 1;
            }
            DataObject::TreeGrid(g) => {
                self.cells += g.num_cells();
                self.parts += 1;
            }
            DataObject::Partitioned(p) => p.partitions.iter().for_each(|o| self.add(o)),
            DataObject::Collection(c) => {
                for b in &c.blocks {
                    self.blocks += 1;
                    b.data.partitions.iter().for_each(|o| self.add(o));
                }
            }
            DataObject::MultiBlock(mb) => {
                for child in &mb.children {
                    match &child.data {
                        Some(DataObject::MultiBlock(_)) => {}
                        _ => self.blocks += 1,
                    }
                    if let Some(d) = &child.data {
                        self.add(d);
                    }
                }
            }
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut level = "info";
    let mut json = false;
    let mut filtered: Vec<&str> = Vec::new();
    for arg in args.iter().skip(1) {
        match arg.as_str() {
            "-v" | "--verbose" => level = "debug",
            "-vv" | "--trace" => level = "trace",
            "-q" | "--quiet" => level = "warn",
            "-j" | "--json" => json = true,
            _ => filtered.push(arg),
        }
    }
    init_logging(level);

    let Some(&command) = filtered.first() else {
        print_help();
        return;
    };
    match command {
        "info" | "i" => cmd_info(file_arg(&filtered), json),
        "tree" | "t" => cmd_tree(file_arg(&filtered)),
        "steps" | "s" => cmd_steps(file_arg(&filtered)),
        "version" | "--version" | "-V" => {
            println!("hdfmesh-cli {} (built {})", env!("CARGO_PKG_VERSION"), env!("HDFMESH_BUILD_DATE"));
        }
        "help" | "h" | "--help" | "-h" => print_help(),
        path if path.ends_with(".hdfm") => cmd_info(path, json),
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            process::exit(1);
        }
    }
}

fn file_arg<'a>(args: &[&'a str]) -> &'a str {
    match args.get(1) {
        Some(f) => f,
        None => {
            eprintln!("Error: missing file argument");
            eprintln!("Usage: hdfmesh-cli {} <file>", args[0]);
            process::exit(1);
        }
    }
}

fn print_help() {
    println!("hdfmesh-cli - mesh container inspector");
    println!();
    println!("USAGE:");
    println!("    hdfmesh-cli [OPTIONS] <COMMAND> <file>");
    println!();
    println!("COMMANDS:");
    println!("    i, info   <file>    Show kind, version, steps and counts");
    println!("    t, tree   <file>    Show the container hierarchy");
    println!("    s, steps  <file>    Show step values and step offset tables");
    println!("    version             Show version and build date");
    println!("    h, help             Show this help");
    println!();
    println!("OPTIONS:");
    println!("    -j, --json       Print info as JSON");
    println!("    -v, --verbose    Show debug output");
    println!("    -vv, --trace     Show trace output (very verbose)");
    println!("    -q, --quiet      Only show warnings and errors");
    println!();
    println!("RUST_LOG overrides the verbosity flags.");
}

fn open(path: &str) -> Reader {
    info!("Opening container: {}", path);
    let mut reader = Reader::new();
    if let Err(e) = reader.open(path) {
        eprintln!("Failed to open {}: {}", path, e);
        process::exit(1);
    }
    reader
}

fn cmd_info(path: &str, json: bool) {
    let mut reader = open(path);
    let kind = reader.kind().map(|k| k.type_name()).unwrap_or("unknown");
    let version = reader.version().map(|v| v.to_string()).unwrap_or_default();
    let steps = reader.number_of_steps();
    let range = reader.time_range();

    let piece = match reader.update() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            process::exit(1);
        }
    };
    let mut counts = Counts::default();
    counts.add(&piece);
    debug!(?counts, "counted first step");

    if json {
        let value = serde_json::json!({
            "path": path,
            "kind": kind,
            "version": version,
            "steps": steps,
            "time_range": range.map(|(lo, hi)| [lo, hi]),
            "points": counts.points,
            "cells": counts.cells,
            "parts": counts.parts,
            "blocks": counts.blocks,
        });
        match serde_json::to_string_pretty(&value) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Failed to encode JSON: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("File:    {}", path);
    println!("Kind:    {}", kind);
    println!("Version: {}", version);
    println!("Steps:   {}", steps);
    if let Some((lo, hi)) = range {
        println!("Time:    {} .. {}", lo, hi);
    }
    println!();
    println!("First step:");
    println!("  Parts:  {}", counts.parts);
    if counts.blocks > 0 {
        println!("  Blocks: {}", counts.blocks);
    }
    println!("  Points: {}", counts.points);
    println!("  Cells:  {}", counts.cells);
}

fn cmd_tree(path: &str) {
    let reader = open(path);
    let Some(container) = reader.container() else {
        return;
    };
    println!("Container: {}", path);
    println!();
    print_group(&container.root(), 0);
}

fn print_group(group: &Group<'_>, depth: usize) {
    let indent = "  ".repeat(depth);
    for (name, value) in group.attrs().iter() {
        println!("{}@{} = {:?}", indent, name, value);
    }
    for (name, node) in group.children() {
        match node {
            Node::Group(_) => {
                println!("{}{}/", indent, name);
                if let Ok(child) = group.group(name) {
                    print_group(&child, depth + 1);
                }
            }
            Node::Dataset(ds) => {
                println!("{}{}  {} {}", indent, name, ds.element_type.name(), ds.shape);
            }
            Node::Link(target) => println!("{}{} -> {}", indent, name, target),
        }
    }
}

fn cmd_steps(path: &str) {
    let reader = open(path);
    let values = reader.step_values();
    if values.is_empty() {
        println!("{}: static dataset", path);
        return;
    }
    println!("Steps: {}", values.len());
    for (i, v) in values.iter().enumerate() {
        println!("  [{}] t = {}", i, v);
    }

    let Some(steps) = reader
        .container()
        .and_then(|c| c.group(&format!("/{}/{}", ROOT_GROUP, STEPS_GROUP)).ok())
    else {
        return;
    };
    println!();
    println!("Offset tables:");
    for (name, node) in steps.children() {
        if !matches!(node, Node::Dataset(_)) {
            continue;
        }
        let Ok(ds) = steps.dataset(name) else { continue };
        if !ds.element_type().is_integer() {
            continue;
        }
        match ds.read_i64_all() {
            Ok(table) => {
                let width = ds.shape().row_len().max(1);
                let rows: Vec<String> = table.chunks(width).map(|r| format!("{:?}", r)).collect();
                println!("  {:<34} {}", name, rows.join(" "));
            }
            Err(e) => println!("  {:<34} <{}>", name, e),
        }
    }
}
