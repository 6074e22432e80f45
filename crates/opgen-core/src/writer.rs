/// Indentation-aware text sink for generated C++.
#[derive(Debug)]
pub struct SourceWriter {
    out: String,
    indent: usize,
    at_line_start: bool,
    namespaces: Vec<String>,
}

const INDENT: &str = "  ";

impl Default for SourceWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceWriter {
    pub fn new() -> Self {
        SourceWriter {
            out: String::new(),
            indent: 0,
            at_line_start: true,
            namespaces: Vec::new(),
        }
    }

    pub fn write(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if self.at_line_start {
            for _ in 0..self.indent {
                self.out.push_str(INDENT);
            }
            self.at_line_start = false;
        }
        self.out.push_str(s);
    }

    /// Writes `s` and ends the line. Blank lines carry no indentation.
    pub fn writeline(&mut self, s: &str) {
        self.write(s);
        self.out.push('\n');
        self.at_line_start = true;
    }

    /// Appends already-indented text, such as a body rendered by another writer.
    pub fn write_raw(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.out.push_str(text);
        self.at_line_start = text.ends_with('\n');
    }

    pub fn push_indent(&mut self) {
        self.indent += 1;
    }

    pub fn pop_indent(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub fn push_namespace(&mut self, name: &str) {
        self.writeline(&format!("namespace {name} {{"));
        self.namespaces.push(name.to_string());
    }

    pub fn pop_namespaces(&mut self) {
        while let Some(name) = self.namespaces.pop() {
            self.writeline(&format!("}} // namespace {name}"));
        }
    }

    pub fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_only_non_empty_lines() {
        let mut w = SourceWriter::new();
        w.push_namespace("outer");
        w.writeline("void f() {");
        w.push_indent();
        w.write("int x");
        w.writeline(" = 1;");
        w.writeline("");
        w.pop_indent();
        w.writeline("}");
        w.pop_namespaces();
        assert_eq!(
            w.finish(),
            "namespace outer {\nvoid f() {\n  int x = 1;\n\n}\n} // namespace outer\n"
        );
    }
}
