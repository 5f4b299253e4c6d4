/// Quote a value as a SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Comma-separated list of quoted literals, for `IN (…)`
pub fn quote_literal_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    values
        .into_iter()
        .map(quote_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Line writer for PL/pgSQL bodies, two spaces per nesting level
#[derive(Debug, Default)]
pub struct BodyWriter {
    lines: Vec<String>,
    depth: usize,
}

impl BodyWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.lines.push(format!("{}{}", "  ".repeat(self.depth), text.as_ref()));
    }

    /// Write `open`, the nested block, then `close`
    pub fn block(&mut self, open: impl AsRef<str>, close: impl AsRef<str>, body: impl FnOnce(&mut Self)) {
        self.line(open);
        self.nested(body);
        self.line(close);
    }

    pub fn nested(&mut self, body: impl FnOnce(&mut Self)) {
        self.depth += 1;
        body(self);
        self.depth -= 1;
    }

    pub fn finish(self) -> String {
        self.lines.join("\n")
    }
}
