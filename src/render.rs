use serde::Serialize;
use std::collections::BTreeMap;

/// Page geometry shared with the host's drawing surface. Units follow the
/// A4 layout the front end prints with: text starts at x=20, the first page
/// at y=30 and later pages at y=20, each line advances y by 7, and anything
/// past y=270 moves to a fresh page.
pub const TEXT_X: i64 = 20;
pub const FIRST_PAGE_TOP: i64 = 30;
pub const PAGE_TOP: i64 = 20;
pub const LINE_STEP: i64 = 7;
pub const PAGE_BOTTOM: i64 = 270;

/// Character budget per wrapped line at the 12pt body size.
pub const WRAP_COLUMNS: usize = 88;

/// Fallback shown for personal fields with no value on record.
pub const NOT_INFORMED: &str = "Not informed";

/// Resolved placeholder values for one document. Keys are the bare token
/// names (no brackets). A `BTreeMap` keeps rendering deterministic.
pub type FieldMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextOp {
    pub x: i64,
    pub y: i64,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub ops: Vec<TextOp>,
}

/// A rendered document: draw commands grouped by page, ready for the host's
/// PDF surface.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub pages: Vec<Page>,
}

/// Table-layout command set used by the report tabulators: a centered title,
/// a few meta lines (period, emission date), then a head row and body rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableModel {
    pub title: String,
    pub meta: Vec<String>,
    pub head: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Replace every recognized `[TOKEN]` in `template` with its value from
/// `fields`. Single pass over the input: substituted values are emitted
/// directly and never rescanned, so a value containing a bracket sequence
/// cannot be expanded again. Unrecognized bracket sequences (and stray `[`)
/// pass through verbatim.
pub fn substitute(template: &str, fields: &FieldMap) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find(']') {
            Some(close) => {
                let name = &after[..close];
                match fields.get(name) {
                    Some(value) => {
                        out.push_str(value);
                    }
                    None => {
                        out.push('[');
                        out.push_str(name);
                        out.push(']');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                // No closing bracket anywhere ahead; emit the tail as-is.
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Wrap one logical line to the column budget, breaking at spaces where
/// possible. An empty line survives as an empty line.
fn wrap_line(line: &str, columns: usize) -> Vec<String> {
    if line.chars().count() <= columns {
        return vec![line.to_string()];
    }

    let mut wrapped = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in line.split(' ') {
        let word_len = word.chars().count();
        if current_len == 0 {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= columns {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            wrapped.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
        // A single word longer than the budget is split hard.
        while current_len > columns {
            let split_at = current
                .char_indices()
                .nth(columns)
                .map(|(i, _)| i)
                .unwrap_or(current.len());
            let tail = current.split_off(split_at);
            wrapped.push(std::mem::take(&mut current));
            current = tail;
            current_len = current.chars().count();
        }
    }
    wrapped.push(current);
    wrapped
}

/// Wrap already-substituted text and lay it onto pages as text ops.
pub fn paginate(content: &str) -> Document {
    let mut doc = Document::default();
    let mut page = Page::default();
    let mut y = FIRST_PAGE_TOP;

    for logical in content.lines() {
        for line in wrap_line(logical, WRAP_COLUMNS) {
            if y > PAGE_BOTTOM {
                doc.pages.push(std::mem::take(&mut page));
                y = PAGE_TOP;
            }
            page.ops.push(TextOp {
                x: TEXT_X,
                y,
                text: line,
            });
            y += LINE_STEP;
        }
    }
    doc.pages.push(page);
    doc
}

/// Render one template against one field map: substitution then pagination.
pub fn render(template: &str, fields: &FieldMap) -> Document {
    paginate(&substitute(template, fields))
}

/// Batch rendering for per-student runs: every document starts on a fresh
/// page, in input order.
pub fn render_batch(template: &str, field_maps: &[FieldMap]) -> Document {
    let mut doc = Document::default();
    for fields in field_maps {
        doc.pages.extend(render(template, fields).pages);
    }
    doc
}

/// Human-readable artifact filename: lowercased title with spaces dashed,
/// then the entity name and period, e.g. `declaracao-de-matricula-Ana-2025`.
pub fn artifact_name(title: &str, entity: &str, period: &str) -> String {
    let slug = title.to_lowercase().replace(' ', "-");
    format!("{}-{}-{}", slug, entity, period)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitute_replaces_every_occurrence() {
        let f = fields(&[("NOME_ALUNO", "Ana"), ("TURMA", "7B")]);
        assert_eq!(
            substitute("Hello [NOME_ALUNO], turma [TURMA]", &f),
            "Hello Ana, turma 7B"
        );
        assert_eq!(
            substitute("[NOME_ALUNO] e [NOME_ALUNO]", &f),
            "Ana e Ana"
        );
    }

    #[test]
    fn substitute_leaves_unrecognized_tokens_verbatim() {
        let f = fields(&[("TURMA", "7B")]);
        assert_eq!(
            substitute("[DESCONHECIDO] da [TURMA]", &f),
            "[DESCONHECIDO] da 7B"
        );
        assert_eq!(substitute("sem fechamento [TURMA", &f), "sem fechamento [TURMA");
    }

    #[test]
    fn substitute_never_rescans_values() {
        // A value that itself looks like a token must come through literally.
        let f = fields(&[("NOME_ALUNO", "[TURMA]"), ("TURMA", "7B")]);
        assert_eq!(substitute("aluno: [NOME_ALUNO]", &f), "aluno: [TURMA]");
    }

    #[test]
    fn render_is_deterministic() {
        let f = fields(&[("NOME_ALUNO", "Ana"), ("TURMA", "7B")]);
        let t = "Hello [NOME_ALUNO], turma [TURMA]\nsegunda linha";
        assert_eq!(render(t, &f), render(t, &f));
    }

    #[test]
    fn wrap_breaks_at_spaces() {
        let long = "palavra ".repeat(30);
        let wrapped = wrap_line(long.trim_end(), WRAP_COLUMNS);
        assert!(wrapped.len() > 1);
        for line in &wrapped {
            assert!(line.chars().count() <= WRAP_COLUMNS);
        }
    }

    #[test]
    fn paginate_breaks_past_page_bottom_and_resets_offset() {
        // First page holds lines at y=30..270 step 7, i.e. 35 lines.
        let content = (0..40)
            .map(|i| format!("linha {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let doc = paginate(&content);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].ops.len(), 35);
        assert_eq!(doc.pages[0].ops[0].y, FIRST_PAGE_TOP);
        assert_eq!(doc.pages[1].ops[0].y, PAGE_TOP);
        assert_eq!(doc.pages[1].ops.len(), 5);
    }

    #[test]
    fn batch_starts_each_document_on_a_new_page() {
        let maps = vec![
            fields(&[("NOME_ALUNO", "Ana")]),
            fields(&[("NOME_ALUNO", "Bruno")]),
        ];
        let doc = render_batch("Aluno: [NOME_ALUNO]", &maps);
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].ops[0].text, "Aluno: Ana");
        assert_eq!(doc.pages[1].ops[0].text, "Aluno: Bruno");
        assert_eq!(doc.pages[1].ops[0].y, FIRST_PAGE_TOP);
    }

    #[test]
    fn artifact_name_is_human_readable() {
        assert_eq!(
            artifact_name("Declaracao de Matricula", "Ana", "2025"),
            "declaracao-de-matricula-Ana-2025"
        );
    }
}
