//! TypeScript tree-sitter node kinds
//!
//! Constants matching the node type names of the tree-sitter-typescript
//! grammar, so the extractors never compare against inline magic strings.

// Declarations
pub const CLASS_DECLARATION: &str = "class_declaration";
pub const ABSTRACT_CLASS_DECLARATION: &str = "abstract_class_declaration";
pub const INTERFACE_DECLARATION: &str = "interface_declaration";
pub const FUNCTION_DECLARATION: &str = "function_declaration";
pub const GENERATOR_FUNCTION_DECLARATION: &str = "generator_function_declaration";
pub const METHOD_DEFINITION: &str = "method_definition";
pub const LEXICAL_DECLARATION: &str = "lexical_declaration";
pub const VARIABLE_DECLARATION: &str = "variable_declaration";
pub const VARIABLE_DECLARATOR: &str = "variable_declarator";
pub const ENUM_DECLARATION: &str = "enum_declaration";
pub const TYPE_ALIAS_DECLARATION: &str = "type_alias_declaration";

// Class members
pub const PUBLIC_FIELD_DEFINITION: &str = "public_field_definition";
pub const PROPERTY_SIGNATURE: &str = "property_signature";
pub const METHOD_SIGNATURE: &str = "method_signature";
pub const ABSTRACT_METHOD_SIGNATURE: &str = "abstract_method_signature";

// Functions
pub const ARROW_FUNCTION: &str = "arrow_function";
pub const FUNCTION_EXPRESSION: &str = "function_expression";

// Import/Export
pub const IMPORT_STATEMENT: &str = "import_statement";
pub const IMPORT_CLAUSE: &str = "import_clause";
pub const NAMED_IMPORTS: &str = "named_imports";
pub const IMPORT_SPECIFIER: &str = "import_specifier";
pub const NAMESPACE_IMPORT: &str = "namespace_import";
pub const EXPORT_STATEMENT: &str = "export_statement";
pub const EXPORT_CLAUSE: &str = "export_clause";
pub const EXPORT_SPECIFIER: &str = "export_specifier";

// Heritage
pub const CLASS_HERITAGE: &str = "class_heritage";
pub const EXTENDS_CLAUSE: &str = "extends_clause";
pub const EXTENDS_TYPE_CLAUSE: &str = "extends_type_clause";
pub const IMPLEMENTS_CLAUSE: &str = "implements_clause";

// Types
pub const TYPE_ANNOTATION: &str = "type_annotation";
pub const TYPE_IDENTIFIER: &str = "type_identifier";
pub const GENERIC_TYPE: &str = "generic_type";

// Expressions
pub const CALL_EXPRESSION: &str = "call_expression";
pub const MEMBER_EXPRESSION: &str = "member_expression";
pub const IDENTIFIER: &str = "identifier";
pub const STRING: &str = "string";
pub const STRING_FRAGMENT: &str = "string_fragment";

// Misc
pub const COMMENT: &str = "comment";
pub const DECORATOR: &str = "decorator";
pub const ACCESSIBILITY_MODIFIER: &str = "accessibility_modifier";
pub const STATEMENT_BLOCK: &str = "statement_block";
