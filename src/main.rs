// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! `reslist-demo`: exercises the library end to end from a real `main` —
//! a scoped reslist, a few committed cleanups, a protected call that may
//! fail, reported through the top-level default catch.

use clap::{Parser, Subcommand};

use reslist::alloc::xstrdup;
use reslist::current::ScopedReslist;
use reslist::error::set_prgname;
use reslist::resource::{cleanup_allocate, cleanup_commit};
use reslist::unwind::{catch_error, die, run_with_default_catch};
use reslist::xaprintf;

#[derive(Parser)]
#[command(name = "reslist-demo", about = "Exercises the reslist runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs a scoped allocation, printing each cleanup as it fires.
    Run,
    /// Runs the same scope but forces a failure partway through, to show
    /// that cleanups still fire and the error is reported by the default
    /// catch at the top level.
    Fail,
}

fn run_scope() {
    let _scope = ScopedReslist::new();

    let greeting = xstrdup("entering scope");
    println!("{}", greeting.as_str());

    for name in ["first", "second", "third"] {
        let slot = cleanup_allocate(&reslist::current::current());
        cleanup_commit(&slot, move || println!("cleanup: {name}"));
    }

    let note = xaprintf!("registered {} cleanups", 3);
    println!("{}", note.as_str());
}

fn run_scope_then_fail() {
    let _scope = ScopedReslist::new();

    for name in ["alpha", "beta"] {
        let slot = cleanup_allocate(&reslist::current::current());
        cleanup_commit(&slot, move || println!("cleanup: {name}"));
    }

    die(libc::EIO, "demo failure requested by `fail` subcommand");
}

fn main() {
    set_prgname("reslist-demo");
    let cli = Cli::parse();

    run_with_default_catch(move || match cli.command {
        Command::Run => {
            let failed = catch_error(run_scope, None);
            debug_assert!(!failed);
        }
        Command::Fail => {
            run_scope_then_fail();
        }
    });
}
