use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::notice::ResultTable;
use crate::utils::{NoticeError, NoticeResult};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

/// 样式 1：粗体表头；样式 2：自动换行的正文
const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="2"><font><sz val="11"/><name val="Calibri"/></font><font><b/><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0" applyAlignment="1"><alignment wrapText="1" vertical="top"/></xf></cellXfs></styleSheet>"#;

const SPREADSHEET_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIP_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const HEADER_STYLE: &str = "1";
const BODY_STYLE: &str = "2";

/// Excel 工作表名最长 31 个字符，且不能包含 []:*?/\
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned
    }
}

/// 0 → A, 25 → Z, 26 → AA
pub fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

/// XML 1.0 不允许的控制字符
fn xml_safe(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect()
}

pub fn write_workbook(table: &ResultTable, sheet_name: &str) -> NoticeResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, Vec<u8>); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec()),
        ("_rels/.rels", ROOT_RELS.as_bytes().to_vec()),
        ("docProps/core.xml", core_properties().into_bytes()),
        ("xl/workbook.xml", workbook_xml(&sanitize_sheet_name(sheet_name))?),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes().to_vec()),
        ("xl/styles.xml", STYLES.as_bytes().to_vec()),
    ];
    for (name, body) in parts {
        zip.start_file(name, options).map_err(zip_error)?;
        zip.write_all(&body)?;
    }

    zip.start_file("xl/worksheets/sheet1.xml", options)
        .map_err(zip_error)?;
    zip.write_all(&sheet_xml(table)?)?;

    let cursor = zip.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}

fn core_properties() -> String {
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>GST Litigation Tracker</dc:title><dcterms:created xsi:type="dcterms:W3CDTF">{created}</dcterms:created></cp:coreProperties>"#
    )
}

fn workbook_xml(sheet_name: &str) -> NoticeResult<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    write(
        &mut writer,
        Event::Start(
            BytesStart::new("workbook")
                .with_attributes([("xmlns", SPREADSHEET_NS), ("xmlns:r", RELATIONSHIP_NS)]),
        ),
    )?;
    write(&mut writer, Event::Start(BytesStart::new("sheets")))?;
    write(
        &mut writer,
        Event::Empty(BytesStart::new("sheet").with_attributes([
            ("name", sheet_name),
            ("sheetId", "1"),
            ("r:id", "rId1"),
        ])),
    )?;
    write(&mut writer, Event::End(BytesEnd::new("sheets")))?;
    write(&mut writer, Event::End(BytesEnd::new("workbook")))?;
    Ok(writer.into_inner())
}

fn sheet_xml(table: &ResultTable) -> NoticeResult<Vec<u8>> {
    let mut writer = Writer::new(Vec::new());
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    write(
        &mut writer,
        Event::Start(BytesStart::new("worksheet").with_attributes([("xmlns", SPREADSHEET_NS)])),
    )?;

    // 表头冻结
    write(&mut writer, Event::Start(BytesStart::new("sheetViews")))?;
    write(
        &mut writer,
        Event::Start(BytesStart::new("sheetView").with_attributes([("workbookViewId", "0")])),
    )?;
    write(
        &mut writer,
        Event::Empty(BytesStart::new("pane").with_attributes([
            ("ySplit", "1"),
            ("topLeftCell", "A2"),
            ("activePane", "bottomLeft"),
            ("state", "frozen"),
        ])),
    )?;
    write(&mut writer, Event::End(BytesEnd::new("sheetView")))?;
    write(&mut writer, Event::End(BytesEnd::new("sheetViews")))?;

    write(&mut writer, Event::Start(BytesStart::new("sheetData")))?;
    let header: Vec<&str> = ResultTable::columns().to_vec();
    write_row(&mut writer, 1, &header, HEADER_STYLE)?;
    for (i, cells) in table.cells().enumerate() {
        write_row(&mut writer, i + 2, &cells, BODY_STYLE)?;
    }
    write(&mut writer, Event::End(BytesEnd::new("sheetData")))?;

    write(&mut writer, Event::End(BytesEnd::new("worksheet")))?;
    Ok(writer.into_inner())
}

fn write_row(
    writer: &mut Writer<Vec<u8>>,
    row_number: usize,
    cells: &[&str],
    style: &str,
) -> NoticeResult<()> {
    let row_ref = row_number.to_string();
    write(writer, Event::Start(BytesStart::new("row").with_attributes([("r", row_ref.as_str())])))?;

    for (col, value) in cells.iter().enumerate() {
        let cell_ref = format!("{}{}", column_name(col), row_number);
        if value.is_empty() {
            write(
                writer,
                Event::Empty(
                    BytesStart::new("c").with_attributes([("r", cell_ref.as_str()), ("s", style)]),
                ),
            )?;
            continue;
        }
        write(
            writer,
            Event::Start(BytesStart::new("c").with_attributes([
                ("r", cell_ref.as_str()),
                ("s", style),
                ("t", "inlineStr"),
            ])),
        )?;
        write(writer, Event::Start(BytesStart::new("is")))?;
        write(
            writer,
            Event::Start(BytesStart::new("t").with_attributes([("xml:space", "preserve")])),
        )?;
        let text = xml_safe(value);
        write(writer, Event::Text(BytesText::new(&text)))?;
        write(writer, Event::End(BytesEnd::new("t")))?;
        write(writer, Event::End(BytesEnd::new("is")))?;
        write(writer, Event::End(BytesEnd::new("c")))?;
    }

    write(writer, Event::End(BytesEnd::new("row")))?;
    Ok(())
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> NoticeResult<()> {
    writer
        .write_event(event)
        .map_err(|e| NoticeError::Export(format!("XML写入失败: {}", e)))
}

fn zip_error(e: zip::result::ZipError) -> NoticeError {
    NoticeError::Export(format!("xlsx打包失败: {}", e))
}
