//! In-process ordering for backends without a native sort.
//!
//! Inputs arrive in id order and `sort_by` is stable, so ties keep
//! insertion order.

use std::cmp::Ordering;

use crate::model::{Book, BookField, User, UserField};

pub fn compare_books(a: &Book, b: &Book, field: BookField) -> Ordering {
    match field {
        BookField::Title => a.title.cmp(&b.title),
        BookField::Authors => a.authors.cmp(&b.authors),
        BookField::Isbn => a.isbn.cmp(&b.isbn),
        BookField::Pages => a.pages.cmp(&b.pages),
        BookField::Quantity => a.quantity.cmp(&b.quantity),
    }
}

pub fn compare_users(a: &User, b: &User, field: UserField) -> Ordering {
    match field {
        UserField::Name => a.name.cmp(&b.name),
        UserField::Username => a.username.cmp(&b.username),
        UserField::Phone => a.phone.cmp(&b.phone),
    }
}

pub fn sort_books(books: &mut [Book], field: BookField) {
    books.sort_by(|a, b| compare_books(a, b, field));
}

pub fn sort_users(users: &mut [User], field: UserField) {
    users.sort_by(|a, b| compare_users(a, b, field));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: u64, title: &str, pages: u32) -> Book {
        Book {
            id,
            isbn: id.to_string(),
            title: title.to_string(),
            authors: vec!["A".into()],
            pages,
            quantity: 1,
            borrowers: Default::default(),
        }
    }

    #[test]
    fn test_numeric_and_lexicographic() {
        let mut books = vec![book(1, "9 Lives", 10), book(2, "10 Rules", 9)];

        sort_books(&mut books, BookField::Pages);
        assert_eq!(books[0].pages, 9);

        sort_books(&mut books, BookField::Title);
        assert_eq!(books[0].title, "10 Rules");
    }

    #[test]
    fn test_stable_ties() {
        let mut books = vec![book(1, "B", 5), book(2, "A", 5), book(3, "C", 1)];
        sort_books(&mut books, BookField::Pages);
        let ids: Vec<u64> = books.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }
}
