use anyhow::{Context, Result};
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Worksheet};

use crate::engine::merge::MergedSection;
use crate::table::Cell;
use crate::utils::display_width;

/// Last column (P) of the merged title and subtitle bands
const BANNER_LAST_COL: u16 = 15;
const TITLE_ROW: u32 = 0;
const SUBTITLE_ROW: u32 = 2;
pub const HEADER_ROW: u32 = 4;
pub const FIRST_DATA_ROW: u32 = HEADER_ROW + 1;

const MIN_WIDTH: usize = 10;
const MAX_WIDTH: usize = 50;

/// Cell styles shared by the index and the data sheets
pub struct SheetFormats {
    pub title: Format,
    pub subtitle: Format,
    pub header: Format,
    pub text: Format,
    pub text_alt: Format,
    pub number: Format,
    pub number_alt: Format,
    pub centered: Format,
    pub centered_alt: Format,
}

impl SheetFormats {
    pub fn new() -> Self {
        let body = Format::new()
            .set_font_size(10)
            .set_border(FormatBorder::Thin)
            .set_align(FormatAlign::VerticalCenter);
        let alt = |f: &Format| f.clone().set_background_color(Color::RGB(0xF2F2F2));

        let text = body.clone().set_align(FormatAlign::Left);
        let number = body.clone().set_align(FormatAlign::Right);
        let centered = body.clone().set_align(FormatAlign::Center);

        SheetFormats {
            title: Format::new()
                .set_bold()
                .set_font_size(14)
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter),
            subtitle: Format::new()
                .set_bold()
                .set_font_size(12)
                .set_align(FormatAlign::Left)
                .set_align(FormatAlign::VerticalCenter),
            header: Format::new()
                .set_bold()
                .set_font_size(11)
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(0x4472C4))
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
                .set_border(FormatBorder::Thin),
            text_alt: alt(&text),
            number_alt: alt(&number),
            centered_alt: alt(&centered),
            text,
            number,
            centered,
        }
    }

    pub fn text_for(&self, row_idx: usize) -> &Format {
        if row_idx % 2 == 1 {
            &self.text_alt
        } else {
            &self.text
        }
    }

    pub fn number_for(&self, row_idx: usize) -> &Format {
        if row_idx % 2 == 1 {
            &self.number_alt
        } else {
            &self.number
        }
    }

    pub fn centered_for(&self, row_idx: usize) -> &Format {
        if row_idx % 2 == 1 {
            &self.centered_alt
        } else {
            &self.centered
        }
    }
}

impl Default for SheetFormats {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn col_num(index: usize) -> Result<u16> {
    u16::try_from(index).context("too many columns for a worksheet")
}

pub(crate) fn row_num(index: usize) -> Result<u32> {
    u32::try_from(index).context("too many rows for a worksheet")
}

/// Column width from the longest rendered value, header included
pub fn fitted_width<'a>(values: impl Iterator<Item = &'a str>) -> f64 {
    let longest = values.map(display_width).max().unwrap_or(0);
    (longest + 2).clamp(MIN_WIDTH, MAX_WIDTH) as f64
}

/// Write one merged section: title band, subtitle band, header, styled rows.
pub fn write_section_sheet(
    worksheet: &mut Worksheet,
    formats: &SheetFormats,
    title: &str,
    section: &MergedSection,
) -> Result<()> {
    worksheet.merge_range(TITLE_ROW, 0, TITLE_ROW, BANNER_LAST_COL, title, &formats.title)?;
    let subtitle = format!("{} - {}", section.spec.table_ref, section.spec.reference);
    worksheet.merge_range(
        SUBTITLE_ROW,
        0,
        SUBTITLE_ROW,
        BANNER_LAST_COL,
        &subtitle,
        &formats.subtitle,
    )?;

    let table = &section.table;
    for (c, column) in table.columns().iter().enumerate() {
        worksheet.write_string_with_format(HEADER_ROW, col_num(c)?, &column.label, &formats.header)?;
    }

    for (r, row) in table.rows().iter().enumerate() {
        let excel_row = FIRST_DATA_ROW + row_num(r)?;
        for (c, cell) in row.cells.iter().enumerate() {
            let col = col_num(c)?;
            match cell {
                Cell::Number(n) => {
                    worksheet.write_number_with_format(excel_row, col, *n, formats.number_for(r))?;
                }
                Cell::Int(i) => {
                    worksheet.write_number_with_format(
                        excel_row,
                        col,
                        *i as f64,
                        formats.number_for(r),
                    )?;
                }
                Cell::Empty => {
                    worksheet.write_blank(excel_row, col, formats.text_for(r))?;
                }
                other => {
                    worksheet.write_string_with_format(
                        excel_row,
                        col,
                        other.render(),
                        formats.text_for(r),
                    )?;
                }
            }
        }
    }

    for (c, column) in table.columns().iter().enumerate() {
        let rendered: Vec<String> = table
            .rows()
            .iter()
            .map(|row| row.cells.get(c).map(Cell::render).unwrap_or_default())
            .collect();
        let width = fitted_width(
            std::iter::once(column.label.as_str()).chain(rendered.iter().map(String::as_str)),
        );
        worksheet.set_column_width(col_num(c)?, width)?;
    }

    worksheet.set_freeze_panes(FIRST_DATA_ROW, 0)?;
    Ok(())
}
