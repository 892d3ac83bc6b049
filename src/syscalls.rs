//! Mapping test cases onto reachable kernel operations
//!
//! A test exercises the kernel through the system calls its user-space code
//! can reach. The chain is: per-test static call graph (or shell trace) →
//! ground functions → library call graph → candidate syscalls → syscall
//! table → kernel entry symbols → kernel call-graph closure.
//!
//! Every step degrades to an empty set when its input is missing: a test
//! with no static-analysis dump simply touches zero estimated operations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fnv::FnvHashMap;
use regex::Regex;
use tracing::{debug, warn};

use crate::callgraph::CallGraph;

/// Libc wrapper name → kernel entry symbol, parsed from the kernel's
/// syscall table format (`number\tabi\tname\tentry`).
#[derive(Debug, Default)]
pub struct SyscallTable {
    entries: FnvHashMap<String, String>,
}

impl SyscallTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading syscall table {}", path.display()))?;
        let mut entries = FnvHashMap::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                continue;
            }
            // The x32 ABI duplicates entries under different numbers.
            if fields[1] == "x32" {
                continue;
            }
            let wrapper = fields[2].to_string();
            let entry = format!("__do_{}", fields[fields.len() - 1]);
            entries.insert(wrapper, entry);
        }
        Ok(SyscallTable { entries })
    }

    pub fn kernel_entry(&self, wrapper: &str) -> Option<&str> {
        self.entries.get(wrapper).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Static inputs shared across all checkouts of an experiment: dump
/// directories, the library graph, the interesting-syscall list and the
/// syscall table. Read-only after construction.
#[derive(Debug)]
pub struct ReachabilityContext {
    pub test_cg_dir: PathBuf,
    pub selftest_cg_dir: PathBuf,
    pub sh_trace_dir: PathBuf,
    pub library: CallGraph,
    pub syscall_names: HashSet<String>,
    pub table: SyscallTable,
}

impl ReachabilityContext {
    pub fn load(
        test_cg_dir: PathBuf,
        selftest_cg_dir: PathBuf,
        sh_trace_dir: PathBuf,
        library_graph: &Path,
        syscall_list: &Path,
        syscall_table: &Path,
    ) -> Result<Self> {
        let mut library = CallGraph::new();
        library.load_edge_list(library_graph)?;
        let syscall_names = std::fs::read_to_string(syscall_list)
            .with_context(|| format!("reading syscall list {}", syscall_list.display()))?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        let table = SyscallTable::load(syscall_table)?;
        Ok(ReachabilityContext {
            test_cg_dir,
            selftest_cg_dir,
            sh_trace_dir,
            library,
            syscall_names,
            table,
        })
    }

    /// Bind the context to one historical version's kernel graph.
    ///
    /// The kernel graph is loaded fresh and then frozen; rebuilding while
    /// queries are in flight is thereby impossible by construction.
    pub fn for_kernel(&self, kernel_cg: &Path) -> Result<ReachabilityIndex<'_>> {
        let mut kernel = CallGraph::new();
        kernel.load_from_source(kernel_cg)?;
        Ok(ReachabilityIndex {
            ctx: self,
            kernel,
            memo: FnvHashMap::default(),
        })
    }
}

/// Per-version reachability index: one frozen kernel graph plus a per-test
/// memo. Single-writer; each experiment unit builds and discards its own.
pub struct ReachabilityIndex<'a> {
    ctx: &'a ReachabilityContext,
    kernel: CallGraph,
    memo: FnvHashMap<String, HashSet<String>>,
}

impl ReachabilityIndex<'_> {
    /// The set of kernel operations the test's entry points can transitively
    /// reach. Memoized per test path; missing side data yields an empty set.
    pub fn reachable_operations(&mut self, test_path: &str) -> HashSet<String> {
        if let Some(cached) = self.memo.get(test_path) {
            return cached.clone();
        }
        let syscalls = self.used_syscalls(test_path);
        let mut operations = HashSet::new();
        for syscall in &syscalls {
            if let Some(entry) = self.ctx.table.kernel_entry(syscall) {
                operations.extend(self.kernel.get_all_call(entry));
            }
        }
        debug!(
            test = test_path,
            syscalls = syscalls.len(),
            operations = operations.len(),
            "resolved reachability"
        );
        self.memo.insert(test_path.to_string(), operations.clone());
        operations
    }

    /// Candidate syscalls the test can issue, from its static dump or shell
    /// trace.
    pub fn used_syscalls(&self, test_path: &str) -> HashSet<String> {
        if test_path.ends_with(".sh") {
            self.shell_syscalls(test_path)
        } else {
            self.compiled_syscalls(test_path)
        }
    }

    fn shell_syscalls(&self, test_path: &str) -> HashSet<String> {
        let stem = match Path::new(test_path).file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => return HashSet::new(),
        };
        let trace_path = self.ctx.sh_trace_dir.join(format!("{stem}.txt"));
        let text = match std::fs::read_to_string(&trace_path) {
            Ok(t) => t,
            Err(_) => return HashSet::new(),
        };
        // Called functions show up as `name(` in the trace.
        let call_re = Regex::new(r"(\w+)\(").expect("static regex");
        let ground: HashSet<&str> = call_re
            .captures_iter(&text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect();
        let mut syscalls = HashSet::new();
        for func in ground {
            syscalls.extend(
                self.ctx
                    .library
                    .interesting_leaves(&self.ctx.syscall_names, func),
            );
        }
        syscalls
    }

    fn compiled_syscalls(&self, test_path: &str) -> HashSet<String> {
        let stem = match Path::new(test_path).file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => return HashSet::new(),
        };
        let dump_name = format!("cg-{stem}.txt");
        let mut dump_path = self.ctx.test_cg_dir.join(&dump_name);
        if !dump_path.exists() {
            dump_path = self.ctx.selftest_cg_dir.join(&dump_name);
            if !dump_path.exists() {
                return HashSet::new();
            }
        }
        let mut test_graph = CallGraph::new();
        if let Err(e) = test_graph.load_from_source(&dump_path) {
            warn!(test = test_path, error = %e, "unreadable per-test call graph, treating as empty");
            return HashSet::new();
        }
        let top_funcs: HashSet<String> = if test_path.contains("selftest") {
            ["main".to_string()].into_iter().collect()
        } else {
            test_graph.get_top_funcs(stem)
        };
        let mut ground = HashSet::new();
        for top in &top_funcs {
            ground.extend(test_graph.get_ground_funcs(top));
        }
        let mut syscalls = HashSet::new();
        for func in &ground {
            syscalls.extend(
                self.ctx
                    .library
                    .interesting_leaves(&self.ctx.syscall_names, func),
            );
        }
        syscalls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, content).unwrap();
        p
    }

    fn context(dir: &TempDir) -> ReachabilityContext {
        let root = dir.path();
        // Library: the caller-direction closure of open_wrapper reaches the
        // `open` syscall leaf, log_msg reaches `write`.
        let lib = write(
            root,
            "lib.txt",
            "open_wrapper : open\nlog_msg : write\n",
        );
        let list = write(root, "syscalls.txt", "open\nwrite\nclose\n");
        let tbl = write(
            root,
            "syscall_64.tbl",
            "# number abi name entry\n\
             2\tcommon\topen\tsys_open\n\
             1\tcommon\twrite\tsys_write\n\
             9999\tx32\topen\tcompat_sys_open\n",
        );
        let cg_dir = root.join("cg");
        let self_dir = root.join("selftest_cg");
        let sh_dir = root.join("sh");
        fs::create_dir_all(&cg_dir).unwrap();
        fs::create_dir_all(&self_dir).unwrap();
        fs::create_dir_all(&sh_dir).unwrap();
        ReachabilityContext::load(cg_dir, self_dir, sh_dir, &lib, &list, &tbl).unwrap()
    }

    fn kernel_dump(dir: &Path) -> PathBuf {
        write(
            dir,
            "kernel-cg.txt",
            "Function: __do_sys_open\n\
             Caller: 1\n\
             \tvfs_open\n\
             Function: vfs_open\n\
             Caller: 1\n\
             \tdo_filp_open\n",
        )
    }

    #[test]
    fn test_syscall_table_skips_x32_and_comments() {
        let dir = TempDir::new().unwrap();
        let tbl = write(
            dir.path(),
            "tbl",
            "# comment\n0\tcommon\tread\tsys_read\n1\tx32\tread\tcompat_sys_read\n",
        );
        let table = SyscallTable::load(&tbl).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.kernel_entry("read"), Some("__do_sys_read"));
    }

    #[test]
    fn test_compiled_reachability_end_to_end() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        // helper is called from open_wrapper, whose caller chain grounds in
        // open_wrapper itself; run_test is a callee-free top func.
        write(
            &ctx.test_cg_dir,
            "cg-open01.txt",
            "Function: helper\n\
             Origin File: ./open01.c: 3\n\
             Caller: 1\n\
             \topen_wrapper\n\
             Function: run_test\n\
             Origin File: ./open01.c: 50\n\
             Caller: 0\n",
        );
        let kernel = kernel_dump(dir.path());
        let mut index = ctx.for_kernel(&kernel).unwrap();
        let ops = index.reachable_operations("test_cases/ltp/open01.c");
        assert!(ops.contains("__do_sys_open"));
        assert!(ops.contains("vfs_open"));
        assert!(ops.contains("do_filp_open"));
    }

    #[test]
    fn test_missing_dump_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let kernel = kernel_dump(dir.path());
        let mut index = ctx.for_kernel(&kernel).unwrap();
        assert!(index.reachable_operations("no_such_test.c").is_empty());
    }

    #[test]
    fn test_shell_trace_reachability() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        write(
            &ctx.sh_trace_dir,
            "fib_tests.txt",
            "log_msg(\"start\")\nopen_wrapper(path)\n",
        );
        let kernel = kernel_dump(dir.path());
        let index = ctx.for_kernel(&kernel).unwrap();
        let syscalls = index.used_syscalls("test_cases/selftests/net/fib_tests.sh");
        assert!(syscalls.contains("open"));
        assert!(syscalls.contains("write"));
    }

    #[test]
    fn test_memoization_returns_same_set() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let kernel = kernel_dump(dir.path());
        let mut index = ctx.for_kernel(&kernel).unwrap();
        let a = index.reachable_operations("nothing.c");
        let b = index.reachable_operations("nothing.c");
        assert_eq!(a, b);
    }
}
