//! Entities, searchable fields and validated inputs shared by every backend.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LibraryError, Result};

/// Operation context attached to every log event a façade call emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Init,
    Add,
    Edit,
    Remove,
    Search,
    Sort,
    Action,
    Stat,
    Show,
    Rate,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Init => "INIT",
            Tag::Add => "ADD",
            Tag::Edit => "EDIT",
            Tag::Remove => "REMOVE",
            Tag::Search => "SEARCH",
            Tag::Sort => "SORT",
            Tag::Action => "ACTION",
            Tag::Stat => "STAT",
            Tag::Show => "SHOW",
            Tag::Rate => "RATE",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: u64,
    pub isbn: String,
    pub title: String,
    pub authors: Vec<String>,
    pub pages: u32,
    /// Copies currently on the shelf.
    pub quantity: u32,
    /// username -> copies on loan
    #[serde(default)]
    pub borrowers: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub name: String,
    pub phone: u64,
    /// isbn -> copies on loan
    #[serde(default)]
    pub borrowing: BTreeMap<String, u32>,
}

/// A validated book ready to be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub authors: Vec<String>,
    pub isbn: String,
    pub pages: u32,
    pub quantity: u32,
}

impl NewBook {
    pub fn new(
        title: impl Into<String>,
        authors: Vec<String>,
        isbn: impl Into<String>,
        pages: u32,
        quantity: u32,
    ) -> Result<Self> {
        let book = Self {
            title: title.into(),
            authors,
            isbn: isbn.into(),
            pages,
            quantity,
        };
        check_text("title", &book.title)?;
        check_text("isbn", &book.isbn)?;
        check_authors(&book.authors)?;
        if book.pages == 0 {
            return Err(LibraryError::invalid("pages", "must be a positive integer"));
        }
        Ok(book)
    }
}

/// A validated user ready to be added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub phone: u64,
}

impl NewUser {
    pub fn new(name: impl Into<String>, username: impl Into<String>, phone: u64) -> Result<Self> {
        let user = Self {
            name: name.into(),
            username: username.into(),
            phone,
        };
        check_text("name", &user.name)?;
        check_text("username", &user.username)?;
        Ok(user)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookField {
    Title,
    Authors,
    Isbn,
    Pages,
    Quantity,
}

impl BookField {
    pub const ALL: [BookField; 5] = [
        BookField::Title,
        BookField::Authors,
        BookField::Isbn,
        BookField::Pages,
        BookField::Quantity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookField::Title => "title",
            BookField::Authors => "authors",
            BookField::Isbn => "isbn",
            BookField::Pages => "pages",
            BookField::Quantity => "quantity",
        }
    }
}

impl fmt::Display for BookField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookField {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "title" => Ok(BookField::Title),
            "author" | "authors" => Ok(BookField::Authors),
            "isbn" => Ok(BookField::Isbn),
            "pages" => Ok(BookField::Pages),
            "quantity" => Ok(BookField::Quantity),
            other => Err(LibraryError::invalid("field", format!("unknown book field {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Name,
    Username,
    Phone,
}

impl UserField {
    pub const ALL: [UserField; 3] = [UserField::Name, UserField::Username, UserField::Phone];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserField::Name => "name",
            UserField::Username => "username",
            UserField::Phone => "phone",
        }
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserField {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(UserField::Name),
            "username" => Ok(UserField::Username),
            "phone" => Ok(UserField::Phone),
            other => Err(LibraryError::invalid("field", format!("unknown user field {other:?}"))),
        }
    }
}

/// A single-field change to a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookEdit {
    Title(String),
    Authors(Vec<String>),
    Pages(u32),
    Quantity(u32),
}

impl BookEdit {
    /// Build an edit from command-line words. Multi-word titles are joined
    /// by one space; every word of an authors edit is one author.
    pub fn parse(field: BookField, values: &[String]) -> Result<Self> {
        require_values(field.as_str(), values)?;
        match field {
            BookField::Title => {
                let title = values.join(" ");
                check_text("title", &title)?;
                Ok(BookEdit::Title(title))
            }
            BookField::Authors => {
                check_authors(values)?;
                Ok(BookEdit::Authors(values.to_vec()))
            }
            BookField::Pages => {
                let pages = parse_pages(&values.join(" "))?;
                Ok(BookEdit::Pages(pages))
            }
            BookField::Quantity => Ok(BookEdit::Quantity(parse_quantity(&values.join(" "))?)),
            BookField::Isbn => Err(LibraryError::invalid("field", "isbn cannot be edited")),
        }
    }

    pub fn field(&self) -> BookField {
        match self {
            BookEdit::Title(_) => BookField::Title,
            BookEdit::Authors(_) => BookField::Authors,
            BookEdit::Pages(_) => BookField::Pages,
            BookEdit::Quantity(_) => BookField::Quantity,
        }
    }
}

/// A single-field change to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserEdit {
    Name(String),
    Phone(u64),
}

impl UserEdit {
    pub fn parse(field: UserField, values: &[String]) -> Result<Self> {
        require_values(field.as_str(), values)?;
        match field {
            UserField::Name => {
                let name = values.join(" ");
                check_text("name", &name)?;
                Ok(UserEdit::Name(name))
            }
            UserField::Phone => Ok(UserEdit::Phone(parse_phone(&values.join(" "))?)),
            UserField::Username => Err(LibraryError::invalid("field", "username cannot be edited")),
        }
    }

    pub fn field(&self) -> UserField {
        match self {
            UserEdit::Name(_) => UserField::Name,
            UserEdit::Phone(_) => UserField::Phone,
        }
    }
}

/// Search criteria for books. `Authors` matches books written by all of
/// the given authors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookQuery {
    Title(String),
    Authors(Vec<String>),
    Isbn(String),
}

impl BookQuery {
    pub fn parse(field: BookField, values: &[String]) -> Result<Self> {
        require_values(field.as_str(), values)?;
        match field {
            BookField::Title => Ok(BookQuery::Title(values.join(" "))),
            BookField::Authors => {
                let mut authors = values.to_vec();
                authors.sort();
                authors.dedup();
                Ok(BookQuery::Authors(authors))
            }
            BookField::Isbn => Ok(BookQuery::Isbn(values.join(" "))),
            BookField::Pages | BookField::Quantity => Err(LibraryError::invalid(
                "field",
                format!("books cannot be searched by {field}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserQuery {
    Name(String),
    Username(String),
    Phone(u64),
}

impl UserQuery {
    pub fn parse(field: UserField, values: &[String]) -> Result<Self> {
        require_values(field.as_str(), values)?;
        let value = values.join(" ");
        match field {
            UserField::Name => Ok(UserQuery::Name(value)),
            UserField::Username => Ok(UserQuery::Username(value)),
            UserField::Phone => Ok(UserQuery::Phone(parse_phone(&value)?)),
        }
    }
}

/// A rating score in 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Score(u8);

impl Score {
    pub fn new(score: u8) -> Result<Self> {
        if (1..=5).contains(&score) {
            Ok(Score(score))
        } else {
            Err(LibraryError::invalid("score", format!("{score} is not in 1..=5")))
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl FromStr for Score {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        let n = s
            .trim()
            .parse::<u8>()
            .map_err(|_| LibraryError::invalid("score", format!("{s:?} is not a number")))?;
        Score::new(n)
    }
}

/// State of one (user, book) loan after a checkout or checkin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loan {
    pub username: String,
    pub isbn: String,
    /// Copies this user still holds; 0 once the loan is closed.
    pub count: u32,
    /// Copies left on the shelf.
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub username: String,
    /// isbn -> copies on loan
    pub loans: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookStats {
    pub isbn: String,
    pub quantity: u32,
    pub borrowers: BTreeSet<String>,
    pub ratings: RatingSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RatingSummary {
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

impl RatingSummary {
    pub fn from_scores(scores: impl IntoIterator<Item = u8>) -> Self {
        let (count, sum) = scores
            .into_iter()
            .fold((0usize, 0u64), |(n, s), score| (n + 1, s + u64::from(score)));
        Self {
            count,
            average: (count > 0).then(|| sum as f64 / count as f64),
        }
    }
}

pub(crate) fn parse_pages(s: &str) -> Result<u32> {
    match s.trim().parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(LibraryError::invalid("pages", format!("{s:?} is not a positive integer"))),
    }
}

pub(crate) fn parse_quantity(s: &str) -> Result<u32> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| LibraryError::invalid("quantity", format!("{s:?} is not a non-negative integer")))
}

pub(crate) fn parse_phone(s: &str) -> Result<u64> {
    s.trim()
        .parse::<u64>()
        .map_err(|_| LibraryError::invalid("phone", format!("{s:?} is not a number")))
}

fn require_values(field: &str, values: &[String]) -> Result<()> {
    if values.is_empty() {
        return Err(LibraryError::invalid(field, "a value is required"));
    }
    Ok(())
}

fn check_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LibraryError::invalid(field, "must not be empty"));
    }
    if value.chars().any(char::is_control) {
        return Err(LibraryError::invalid(field, "must not contain control characters"));
    }
    Ok(())
}

fn check_authors(authors: &[String]) -> Result<()> {
    if authors.is_empty() {
        return Err(LibraryError::invalid("authors", "at least one author is required"));
    }
    authors.iter().try_for_each(|a| check_text("authors", a))?;
    let mut seen = BTreeSet::new();
    if let Some(dup) = authors.iter().find(|a| !seen.insert(a.as_str())) {
        return Err(LibraryError::invalid(
            "authors",
            format!("{dup:?} is listed more than once"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_new_book_validation() {
        assert!(NewBook::new("Dune", words("Herbert"), "111", 412, 2).is_ok());
        assert!(NewBook::new("Dune", words("Herbert"), "111", 0, 2).is_err());
        assert!(NewBook::new("Dune", vec![], "111", 412, 2).is_err());
        assert!(NewBook::new(" ", words("Herbert"), "111", 412, 2).is_err());
        assert!(NewBook::new("Dune", words("Herbert"), "1\x1F1", 412, 2).is_err());
        assert!(matches!(
            NewBook::new("Dune", words("A B A"), "111", 412, 2),
            Err(LibraryError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_field_names() {
        assert_eq!("author".parse::<BookField>().unwrap(), BookField::Authors);
        assert_eq!("phone".parse::<UserField>().unwrap(), UserField::Phone);
        assert!(matches!(
            "color".parse::<BookField>(),
            Err(LibraryError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_edit_parse_joins_words() {
        let edit = BookEdit::parse(BookField::Title, &words("Dune Messiah")).unwrap();
        assert_eq!(edit, BookEdit::Title("Dune Messiah".into()));

        let edit = BookEdit::parse(BookField::Authors, &words("Herbert Anderson")).unwrap();
        assert_eq!(edit, BookEdit::Authors(words("Herbert Anderson")));

        assert!(BookEdit::parse(BookField::Authors, &words("Herbert Herbert")).is_err());
        assert!(BookEdit::parse(BookField::Isbn, &words("222")).is_err());
        assert!(BookEdit::parse(BookField::Pages, &words("0")).is_err());
        assert!(BookEdit::parse(BookField::Quantity, &words("-1")).is_err());
        assert!(BookEdit::parse(BookField::Title, &[]).is_err());

        assert_eq!(
            UserEdit::parse(UserField::Phone, &words("555")).unwrap(),
            UserEdit::Phone(555)
        );
        assert!(UserEdit::parse(UserField::Username, &words("bob")).is_err());
    }

    #[test]
    fn test_query_parse() {
        assert_eq!(
            BookQuery::parse(BookField::Authors, &words("B A B")).unwrap(),
            BookQuery::Authors(words("A B"))
        );
        assert!(BookQuery::parse(BookField::Pages, &words("10")).is_err());
        assert!(UserQuery::parse(UserField::Phone, &words("abc")).is_err());
    }

    #[test]
    fn test_score_bounds() {
        assert!(Score::new(0).is_err());
        assert!(Score::new(6).is_err());
        assert_eq!("5".parse::<Score>().unwrap().get(), 5);
    }

    #[test]
    fn test_rating_summary() {
        let summary = RatingSummary::from_scores([4, 5]);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.average, Some(4.5));
        assert_eq!(RatingSummary::from_scores([]).average, None);
    }
}
