//! Pure line-level text diffing.
//!
//! [`unified_diff`] is deterministic and side-effect free: the same inputs
//! always produce the same output, and equal inputs produce an empty string.
//! Lines keep their endings so the diff reconstructs the originals exactly;
//! the labels are the generic `A` and `B`, not file paths.

/// Context lines kept around each change in a hunk
const CONTEXT: usize = 3;

/// Compute a unified diff of the line-level changes from `a` to `b`.
pub fn unified_diff(a: &str, b: &str) -> String {
    let a_lines = split_keepends(a);
    let b_lines = split_keepends(b);
    let groups = grouped_opcodes(&opcodes(&a_lines, &b_lines));

    if groups.is_empty() {
        return String::new();
    }

    let mut out = String::from("--- A\n+++ B\n");
    for group in groups {
        let first = &group[0];
        let last = &group[group.len() - 1];
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(first.a1, last.a2),
            format_range(first.b1, last.b2),
        ));
        for op in &group {
            match op.tag {
                Tag::Equal => {
                    for line in &a_lines[op.a1..op.a2] {
                        push_line(&mut out, ' ', line);
                    }
                }
                Tag::Replace | Tag::Delete => {
                    for line in &a_lines[op.a1..op.a2] {
                        push_line(&mut out, '-', line);
                    }
                    for line in &b_lines[op.b1..op.b2] {
                        push_line(&mut out, '+', line);
                    }
                }
                Tag::Insert => {
                    for line in &b_lines[op.b1..op.b2] {
                        push_line(&mut out, '+', line);
                    }
                }
            }
        }
    }
    out
}

/// Apply ANSI colors to a rendered diff: additions green, removals red,
/// headers and context untouched.
pub fn colorize(diff: &str) -> String {
    diff.split('\n')
        .map(|line| {
            if line.starts_with('+') && !line.starts_with("+++") {
                format!("\x1b[32m{}\x1b[0m", line)
            } else if line.starts_with('-') && !line.starts_with("---") {
                format!("\x1b[31m{}\x1b[0m", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Replace,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Opcode {
    tag: Tag,
    a1: usize,
    a2: usize,
    b1: usize,
    b2: usize,
}

impl Opcode {
    fn new(tag: Tag, a1: usize, a2: usize, b1: usize, b2: usize) -> Self {
        Self { tag, a1, a2, b1, b2 }
    }
}

fn split_keepends(s: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '\n' {
            lines.push(&s[start..=i]);
            start = i + 1;
        }
    }
    if start < s.len() {
        lines.push(&s[start..]);
    }
    lines
}

fn push_line(out: &mut String, prefix: char, line: &str) {
    out.push(prefix);
    out.push_str(line);
    if !line.ends_with('\n') {
        out.push('\n');
    }
}

fn format_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    match length {
        1 => format!("{}", start + 1),
        0 => format!("{},0", start),
        _ => format!("{},{}", start + 1, length),
    }
}

/// Opcodes from a longest-common-subsequence table. Ties resolve toward
/// consuming `a` first, which keeps the output stable across calls.
fn opcodes(a: &[&str], b: &[&str]) -> Vec<Opcode> {
    let n = a.len();
    let m = b.len();
    let mut lcs = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut ops = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);
    let (mut pa, mut pb) = (0usize, 0usize);
    while i < n && j < m {
        if a[i] == b[j] {
            flush_pending(&mut ops, pa, i, pb, j);
            let (ei, ej) = (i, j);
            while i < n && j < m && a[i] == b[j] {
                i += 1;
                j += 1;
            }
            ops.push(Opcode::new(Tag::Equal, ei, i, ej, j));
            pa = i;
            pb = j;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    flush_pending(&mut ops, pa, n, pb, m);
    ops
}

fn flush_pending(ops: &mut Vec<Opcode>, a1: usize, a2: usize, b1: usize, b2: usize) {
    let tag = match (a1 < a2, b1 < b2) {
        (true, true) => Tag::Replace,
        (true, false) => Tag::Delete,
        (false, true) => Tag::Insert,
        (false, false) => return,
    };
    ops.push(Opcode::new(tag, a1, a2, b1, b2));
}

/// Group opcodes into hunks with up to [`CONTEXT`] equal lines on each side.
/// An all-equal sequence yields no groups at all.
fn grouped_opcodes(codes: &[Opcode]) -> Vec<Vec<Opcode>> {
    let mut codes: Vec<Opcode> = codes.to_vec();
    if codes.is_empty() {
        codes.push(Opcode::new(Tag::Equal, 0, 1, 0, 1));
    }

    if let Some(first) = codes.first_mut() {
        if first.tag == Tag::Equal {
            first.a1 = first.a1.max(first.a2.saturating_sub(CONTEXT));
            first.b1 = first.b1.max(first.b2.saturating_sub(CONTEXT));
        }
    }
    if let Some(last) = codes.last_mut() {
        if last.tag == Tag::Equal {
            last.a2 = last.a2.min(last.a1 + CONTEXT);
            last.b2 = last.b2.min(last.b1 + CONTEXT);
        }
    }

    let mut groups: Vec<Vec<Opcode>> = Vec::new();
    let mut group: Vec<Opcode> = Vec::new();
    for op in codes {
        let mut op = op;
        if op.tag == Tag::Equal && op.a2 - op.a1 > 2 * CONTEXT {
            group.push(Opcode::new(
                Tag::Equal,
                op.a1,
                op.a2.min(op.a1 + CONTEXT),
                op.b1,
                op.b2.min(op.b1 + CONTEXT),
            ));
            groups.push(std::mem::take(&mut group));
            op.a1 = op.a1.max(op.a2.saturating_sub(CONTEXT));
            op.b1 = op.b1.max(op.b2.saturating_sub(CONTEXT));
        }
        group.push(op);
    }
    if !(group.is_empty() || (group.len() == 1 && group[0].tag == Tag::Equal)) {
        groups.push(group);
    }
    groups
}
