//! NRQL Tokens - the atomic units of query output.
//!
//! Every element a query can contain is a `Token`; a `TokenStream`
//! serializes them to text in one place so quoting and escaping rules
//! are never duplicated.

/// NRQL Token - every possible element in a query.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    Facet,
    Limit,
    Max,
    Since,
    Until,
    Ago,
    Timeseries,
    Auto,
    In,
    Like,
    RLike,
    IsNull,
    IsNotNull,
    True,
    False,
    Null,

    // === Punctuation ===
    Comma,
    Star,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,

    // === Whitespace / Formatting ===
    Space,

    // === Dynamic Content ===
    /// Attribute or alias name. Backtick-quoted when it is not a plain
    /// dotted identifier.
    Ident(String),
    /// Event type name in a FROM clause.
    EventType(String),
    /// Integer literal
    LitInt(i64),
    /// Float literal
    LitFloat(f64),
    /// String literal
    LitString(String),
    /// Regular expression literal for RLIKE
    LitRegex(String),
    /// Boolean literal
    LitBool(bool),
    /// Function name, rendered as written (NRQL functions are camelCase).
    FunctionName(String),
    /// Time unit keyword in SINCE/TIMESERIES clauses.
    TimeUnit(&'static str),
}

impl Token {
    /// Serialize this token to its query text.
    pub fn serialize(&self) -> String {
        match self {
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::Facet => "FACET".into(),
            Token::Limit => "LIMIT".into(),
            Token::Max => "MAX".into(),
            Token::Since => "SINCE".into(),
            Token::Until => "UNTIL".into(),
            Token::Ago => "ago".into(),
            Token::Timeseries => "TIMESERIES".into(),
            Token::Auto => "AUTO".into(),
            Token::In => "IN".into(),
            Token::Like => "LIKE".into(),
            Token::RLike => "RLIKE".into(),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::Null => "NULL".into(),

            Token::Comma => ",".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            Token::Eq => "=".into(),
            Token::Ne => "!=".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),

            Token::Space => " ".into(),

            Token::Ident(name) => quote_identifier(name),
            Token::EventType(name) => quote_identifier(name),
            Token::LitInt(n) => n.to_string(),
            Token::LitFloat(f) => {
                // Non-finite values have no NRQL spelling; NULL keeps the
                // query valid and compares false everywhere.
                if !f.is_finite() {
                    return "NULL".into();
                }
                let mut buffer = ryu::Buffer::new();
                buffer.format(*f).to_string()
            }
            Token::LitString(s) => quote_string(s),
            Token::LitRegex(s) => format!("r{}", quote_string(s)),
            Token::LitBool(b) => if *b { "true" } else { "false" }.into(),
            Token::FunctionName(name) => name.clone(),
            Token::TimeUnit(unit) => (*unit).into(),
        }
    }
}

/// Quote an attribute name if it is not a plain dotted identifier.
pub fn quote_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        }
        _ => false,
    };
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "\\`"))
    }
}

/// Quote a string literal with single quotes, escaping backslashes and quotes.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// A stream of tokens that can be serialized to query text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Serialize all tokens to a query string.
    pub fn serialize(&self) -> String {
        self.tokens.iter().map(Token::serialize).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
