//! Instruction text for the language model

use std::fmt::Write;

use crate::identifier::DatasetId;
use crate::schema::ColumnDescriptor;

/// Build the instruction for translating `question` against `table`.
///
/// The output is a pure function of its inputs. The reply shape it asks for
/// is exactly what [`crate::translate::parse_reply`] accepts.
pub fn build_prompt(table: &DatasetId, columns: &[ColumnDescriptor], question: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str("You convert natural language questions into SQL for DuckDB.\n\n");

    let _ = writeln!(prompt, "Table name: {table}");
    prompt.push_str("Columns (name, type):\n");
    for column in columns {
        let _ = writeln!(prompt, "{}, {}", column.name, column.declared_type);
    }

    prompt.push_str(
        "\nRules:\n\
         - Write exactly one read-only SELECT statement.\n\
         - Read only from the table named above; do not reference any other table or table function.\n\
         - Never modify data or schema.\n\
         - Quote column names that contain spaces or punctuation with double quotes.\n",
    );

    let _ = writeln!(prompt, "\nQuestion: {}", question.trim());

    prompt.push_str(
        "\nRespond with a single JSON object and nothing else, in exactly this shape:\n\
         {\"sql\": \"<statement>\"}\n\
         Do not add explanations, comments, or Markdown code fences.",
    );

    prompt
}
