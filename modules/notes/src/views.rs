use arkkit::{Component, Markup, Props};

use crate::state::NotesState;

/// Full note list. Expects to be connected to the notes slice.
pub struct NoteList;

impl Component for NoteList {
    fn render(&self, props: &Props) -> anyhow::Result<Markup> {
        let state = props
            .context_as::<NotesState>()
            .ok_or_else(|| anyhow::anyhow!("note list rendered without the notes slice"))?;

        let class = format!("notes theme-{}", props.global.current_theme_type);
        if state.items.is_empty() {
            return Ok(format!("<p class=\"{class}\">No notes</p>"));
        }
        let mut out = format!("<ul class=\"{class}\">");
        for note in &state.items {
            out.push_str(&format!(
                "<li data-id=\"{}\">{}</li>",
                note.id,
                escape(&note.text)
            ));
        }
        out.push_str("</ul>");
        Ok(out)
    }
}

/// Badge with the note count; renders `0` when unbound.
pub struct NoteCount;

impl Component for NoteCount {
    fn render(&self, props: &Props) -> anyhow::Result<Markup> {
        let count = props
            .context_as::<NotesState>()
            .map(|s| s.items.len())
            .unwrap_or_default();
        Ok(format!("<span class=\"badge\">{count}</span>"))
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
