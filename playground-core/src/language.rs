//! Static catalog of the languages the playground can evaluate.
//!
//! The set is closed: every [`LanguageId`] has exactly one
//! [`LanguageDescriptor`], and the catalog order is the order shown in the
//! language picker.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier of a supported language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageId {
    JavaScript,
    Python,
    Java,
    Cpp,
    CSharp,
    C,
    Kotlin,
    Swift,
    Sql,
    Go,
}

impl LanguageId {
    /// All identifiers, in catalog order.
    pub const ALL: [LanguageId; 10] = [
        LanguageId::JavaScript,
        LanguageId::Python,
        LanguageId::Java,
        LanguageId::Cpp,
        LanguageId::CSharp,
        LanguageId::C,
        LanguageId::Kotlin,
        LanguageId::Swift,
        LanguageId::Sql,
        LanguageId::Go,
    ];

    /// Wire/string form, e.g. `"cpp"`.
    pub fn as_str(self) -> &'static str {
        match self {
            LanguageId::JavaScript => "javascript",
            LanguageId::Python => "python",
            LanguageId::Java => "java",
            LanguageId::Cpp => "cpp",
            LanguageId::CSharp => "csharp",
            LanguageId::C => "c",
            LanguageId::Kotlin => "kotlin",
            LanguageId::Swift => "swift",
            LanguageId::Sql => "sql",
            LanguageId::Go => "go",
        }
    }
}

impl fmt::Display for LanguageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LanguageId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| RegistryError::UnknownLanguage(s.to_string()))
    }
}

/// Registry lookup errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Language '{0}' is not supported yet")]
    UnknownLanguage(String),
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageDescriptor {
    pub id: LanguageId,
    pub display_name: &'static str,
    /// Starter snippet loaded into an empty editor.
    pub default_source: &'static str,
}

static CATALOG: [LanguageDescriptor; 10] = [
    LanguageDescriptor {
        id: LanguageId::JavaScript,
        display_name: "JavaScript",
        default_source: "console.log(\"Hello, World!\");",
    },
    LanguageDescriptor {
        id: LanguageId::Python,
        display_name: "Python",
        default_source: "print(\"Hello, World!\")",
    },
    LanguageDescriptor {
        id: LanguageId::Java,
        display_name: "Java",
        default_source: "public class Main {\n    public static void main(String[] args) {\n        System.out.println(\"Hello, World!\");\n    }\n}",
    },
    LanguageDescriptor {
        id: LanguageId::Cpp,
        display_name: "C++",
        default_source: "#include <iostream>\n\nint main() {\n    std::cout << \"Hello, World!\" << std::endl;\n    return 0;\n}",
    },
    LanguageDescriptor {
        id: LanguageId::CSharp,
        display_name: "C#",
        default_source: "using System;\n\nclass Program {\n    static void Main() {\n        Console.WriteLine(\"Hello, World!\");\n    }\n}",
    },
    LanguageDescriptor {
        id: LanguageId::C,
        display_name: "C",
        default_source: "#include <stdio.h>\n\nint main() {\n    printf(\"Hello, World!\\n\");\n    return 0;\n}",
    },
    LanguageDescriptor {
        id: LanguageId::Kotlin,
        display_name: "Kotlin",
        default_source: "fun main() {\n    println(\"Hello, World!\")\n}",
    },
    LanguageDescriptor {
        id: LanguageId::Swift,
        display_name: "Swift",
        default_source: "import Swift\n\nprint(\"Hello, World!\")",
    },
    LanguageDescriptor {
        id: LanguageId::Sql,
        display_name: "SQL",
        default_source: "SELECT \"Hello, World!\" AS greeting;",
    },
    LanguageDescriptor {
        id: LanguageId::Go,
        display_name: "Go",
        default_source: "package main\n\nimport \"fmt\"\n\nfunc main() {\n    fmt.Println(\"Hello, World!\")\n}",
    },
];

/// All languages in catalog order.
pub fn list_languages() -> &'static [LanguageDescriptor] {
    &CATALOG
}

/// Look up a language by its string id.
pub fn find_language(id: &str) -> Result<&'static LanguageDescriptor, RegistryError> {
    let id: LanguageId = id.parse()?;
    Ok(descriptor(id))
}

/// Descriptor for a known id. Total because the catalog covers every variant.
pub fn descriptor(id: LanguageId) -> &'static LanguageDescriptor {
    CATALOG
        .iter()
        .find(|d| d.id == id)
        .unwrap_or(&CATALOG[0])
}

/// The language a fresh editor starts in.
pub fn default_language() -> &'static LanguageDescriptor {
    &CATALOG[0]
}

/// Recoverable lookup: unknown ids fall back to [`default_language`].
pub fn find_language_or_default(id: &str) -> &'static LanguageDescriptor {
    match find_language(id) {
        Ok(found) => found,
        Err(e) => {
            log::debug!("{e}; falling back to {}", default_language().id);
            default_language()
        }
    }
}

/// Whether `text` is one of the catalog's starter snippets.
pub fn is_default_source(text: &str) -> bool {
    CATALOG.iter().any(|d| d.default_source == text)
}
