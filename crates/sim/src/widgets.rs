//! Page building blocks shared by the routes and the browser

use crate::dom::El;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    Good,
    Bad,
    Warning,
}

impl BannerKind {
    fn class(self) -> &'static str {
        match self {
            BannerKind::Good => "msg-good",
            BannerKind::Bad => "msg-bad",
            BannerKind::Warning => "msg-warning",
        }
    }
}

/// Result message box: title plus an optional list of details
pub fn banner<S: AsRef<str>>(kind: BannerKind, title: &str, details: &[S]) -> El {
    let mut el = El::new("output")
        .class(kind.class())
        .attr("role", "contentinfo")
        .child(El::new("span").class("msg-title").text(title));
    if !details.is_empty() {
        el = el.child(
            El::new("div").class("msg-details").child(
                El::new("ul")
                    .class("msg-details-border")
                    .children(details.iter().map(|d| El::new("li").text(d.as_ref()))),
            ),
        );
    }
    el
}

pub fn label(for_id: &str, text: &str) -> El {
    El::new("label").attr("for", for_id).text(text)
}

pub fn text_input(id: &str, name: &str, value: &str) -> El {
    El::new("input")
        .id(id)
        .name(name)
        .attr("type", "text")
        .value(value)
}

pub fn password_input(id: &str, name: &str) -> El {
    El::new("input").id(id).name(name).attr("type", "password")
}

pub fn hidden_input(name: &str, value: &str) -> El {
    El::new("input")
        .name(name)
        .attr("type", "hidden")
        .value(value)
        .hidden(true)
}

pub fn textarea(id: &str, name: &str, value: &str) -> El {
    El::new("textarea").id(id).name(name).value(value)
}

pub fn checkbox(id: &str, name: &str, value: &str, checked: bool) -> El {
    El::new("input")
        .id(id)
        .name(name)
        .attr("type", "checkbox")
        .attr("value", value)
        .checked(checked)
}

/// `<select>` with `(value, text)` options; `selected` holds option values.
pub fn select<S: AsRef<str>>(
    id: &str,
    name: &str,
    options: &[(String, String)],
    selected: &[S],
    multiple: bool,
) -> El {
    let mut el = El::new("select").id(id).name(name);
    if multiple {
        el = el.attr("multiple", "multiple");
    }
    let mut any = false;
    let mut items = Vec::with_capacity(options.len());
    for (value, text) in options {
        let chosen = selected.iter().any(|s| s.as_ref() == value) && (multiple || !any);
        any |= chosen;
        items.push(
            El::new("option")
                .attr("value", value.as_str())
                .text(text.as_str())
                .checked(chosen),
        );
    }
    if !multiple && !any {
        if let Some(first) = items.first_mut() {
            *first = std::mem::take(first).checked(true);
        }
    }
    el.children(items)
}

pub fn submit(text: &str, name: &str) -> El {
    El::new("button")
        .attr("type", "submit")
        .name(name)
        .attr("value", "1")
        .text(text)
}

pub fn link(text: &str, href: &str) -> El {
    El::new("a").attr("href", href).text(text)
}

/// Button that navigates instead of submitting
pub fn link_button(text: &str, href: &str) -> El {
    El::new("button")
        .attr("type", "button")
        .attr("data-href", href)
        .text(text)
}

pub fn field(label_el: El, control: El) -> El {
    El::new("li").class("form-field").child(label_el).child(control)
}

/// One editable row of a sub-table. Inputs are named `prefix[index][column]`.
pub fn table_row<S: AsRef<str>>(prefix: &str, index: usize, columns: &[S], values: &[S]) -> El {
    let mut row = El::new("tr").class("form_row");
    for (i, column) in columns.iter().enumerate() {
        let column = column.as_ref();
        let value = values.get(i).map(|v| v.as_ref()).unwrap_or("");
        let name = format!("{}[{}][{}]", prefix, index, column);
        let control = if column == "description" {
            El::new("textarea")
                .id(format!("{}_{}_{}", prefix, index, column))
                .name(name)
                .value(value)
        } else {
            El::new("input")
                .id(format!("{}_{}_{}", prefix, index, column))
                .name(name)
                .attr("type", "text")
                .value(value)
        };
        row = row.child(El::new("td").child(control));
    }
    row.child(
        El::new("td").child(
            El::new("button")
                .attr("type", "button")
                .class("btn-link element-table-remove")
                .text("Remove"),
        ),
    )
}

/// Editable sub-table. The `data-*` attributes let the browser append rows.
pub fn sub_table(id: &str, prefix: &str, columns: &[&str], rows: &[Vec<String>]) -> El {
    let header = El::new("thead").child(
        El::new("tr")
            .children(columns.iter().map(|c| El::new("th").text(capitalize(c))))
            .child(El::new("th").text("Action")),
    );
    let mut body = El::new("tbody");
    for (index, values) in rows.iter().enumerate() {
        body = body.child(table_row(prefix, index, columns, &values.iter().map(String::as_str).collect::<Vec<_>>()));
    }
    El::new("table")
        .id(id)
        .class("table-forms")
        .attr("data-prefix", prefix)
        .attr("data-columns", columns.join(","))
        .attr("data-next", rows.len().to_string())
        .child(header)
        .child(body)
        .child(
            El::new("tfoot").child(
                El::new("tr").child(
                    El::new("td").child(
                        El::new("button")
                            .attr("type", "button")
                            .class("btn-link element-table-add")
                            .text("Add"),
                    ),
                ),
            ),
        )
}

/// Read-only list with a header row. An empty list shows a placeholder row.
pub fn list_table(id: &str, headers: &[&str], rows: Vec<Vec<El>>) -> El {
    let head = El::new("thead").child(
        El::new("tr").children(headers.iter().map(|h| El::new("th").text(*h))),
    );
    let body = if rows.is_empty() {
        El::new("tbody").child(
            El::new("tr").class("nothing-to-show").child(
                El::new("td")
                    .attr("colspan", headers.len().to_string())
                    .text("No data found."),
            ),
        )
    } else {
        El::new("tbody").children(
            rows.into_iter()
                .map(|cells| El::new("tr").children(cells.into_iter().map(|c| El::new("td").child(c)))),
        )
    };
    El::new("table").id(id).class("list-table").child(head).child(body)
}

/// Plain text cell content
pub fn cell(text: impl Into<String>) -> El {
    El::new("span").text(text)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
