// Include/exclude glob filtering for unit names

/// Decides which units are in scope for monitoring.
///
/// Include patterns admit, exclude patterns reject, and exclude always wins.
/// Patterns are shell-style globs supporting `*` and `?` only, matched
/// case-sensitively.
#[derive(Debug, Clone, Default)]
pub struct UnitFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl UnitFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Build a filter from comma-separated pattern lists as they appear in
    /// the config file. Tokens are whitespace-trimmed; empty tokens dropped.
    pub fn parse(include: &str, exclude: &str) -> Self {
        Self {
            include: parse_pattern_list(include),
            exclude: parse_pattern_list(exclude),
        }
    }

    pub fn should_monitor(&self, unit_name: &str) -> bool {
        if unit_name.is_empty() {
            return false;
        }
        if !self.include.is_empty()
            && !self.include.iter().any(|p| glob_match(p, unit_name))
        {
            return false;
        }
        !self.exclude.iter().any(|p| glob_match(p, unit_name))
    }
}

pub fn parse_pattern_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Case-sensitive glob match supporting `*` (any run of characters) and `?`
/// (exactly one character). Iterative with single-star backtracking.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star_pi, star_ti)) = backtrack {
            // Widen the last '*' by one character and retry.
            pi = star_pi + 1;
            ti = star_ti + 1;
            backtrack = Some((star_pi, star_ti + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
