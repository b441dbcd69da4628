use super::TabularFormatter;

/// Column-aligned plain text table with a dashed rule under the headers.
pub struct TextFormatter<'a, C> {
    _phantom: std::marker::PhantomData<C>,
    separator: &'a str,
}

impl<'a, C> TextFormatter<'a, C>
where
    C: std::string::ToString,
{
    pub fn new(separator: &'a str) -> Self {
        Self {
            _phantom: std::marker::PhantomData {},
            separator,
        }
    }
}

impl<C> TabularFormatter<C> for TextFormatter<'_, C>
where
    C: std::string::ToString,
{
    type Error = std::fmt::Error;
    fn format<'r, I, O>(&self, headers: &'r [&'r str], rows: O) -> Result<String, Self::Error>
    where
        C: 'r,
        I: IntoIterator<Item = C> + 'r,
        O: IntoIterator<Item = I> + 'r,
    {
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().map(|c| c.to_string()).collect())
            .collect();

        let widths: Vec<usize> = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                rows.iter()
                    .filter_map(|row| row.get(i))
                    .map(String::len)
                    .chain(std::iter::once(header.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(rows.len() + 2);
        if !headers.is_empty() {
            lines.push(render_line(
                headers.iter().copied().enumerate(),
                &widths,
                self.separator,
            ));
            let rule = widths.iter().sum::<usize>() + (widths.len() - 1) * self.separator.len();
            lines.push("-".repeat(rule));
        }
        for row in &rows {
            lines.push(render_line(
                row.iter().take(widths.len()).map(String::as_str).enumerate(),
                &widths,
                self.separator,
            ));
        }
        Ok(lines.join("\n"))
    }
}

fn render_line<'c>(
    cells: impl Iterator<Item = (usize, &'c str)>,
    widths: &[usize],
    separator: &str,
) -> String {
    let mut line = String::new();
    for (i, cell) in cells {
        if i > 0 {
            line.push_str(separator);
        }
        line.push_str(cell);
        if i + 1 < widths.len() {
            line.push_str(&" ".repeat(widths[i].saturating_sub(cell.len())));
        }
    }
    line
}
