//! Generic shuffled deck used for stocks, events and action cards.

use crate::random::RandomSource;
use serde::{Deserialize, Serialize};

/// Ordered pile of cards. The top of the deck is the end of the backing vector:
/// [`ShuffledDeck::deal`] and [`ShuffledDeck::peek`] both look there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShuffledDeck<T> {
    cards: Vec<T>,
}

impl<T> Default for ShuffledDeck<T> {
    fn default() -> Self {
        Self { cards: Vec::new() }
    }
}

impl<T> ShuffledDeck<T> {
    /// Wraps `cards` without shuffling.
    pub fn new(cards: Vec<T>) -> Self {
        Self { cards }
    }

    /// Builds a deck and shuffles it once.
    pub fn shuffled<R: RandomSource + ?Sized>(cards: Vec<T>, rng: &mut R) -> Self {
        let mut deck = Self::new(cards);
        deck.shuffle(rng);
        deck
    }

    /// In-place Fisher-Yates permutation.
    pub fn shuffle<R: RandomSource + ?Sized>(&mut self, rng: &mut R) {
        let n = self.cards.len();
        for i in (1..n).rev() {
            let j = rng.next_int(0, i as i64) as usize;
            self.cards.swap(i, j);
        }
    }

    /// Removes and returns the top card, `None` when empty.
    pub fn deal(&mut self) -> Option<T> {
        self.cards.pop()
    }

    /// Top card without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.cards.last()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Cards bottom-to-top.
    pub fn cards(&self) -> &[T] {
        &self.cards
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{ScriptedRandom, SeededRandom};
    use proptest::prelude::*;

    #[test]
    fn default_deck_needs_no_default_cards() {
        struct Card;
        let mut deck: ShuffledDeck<Card> = ShuffledDeck::default();
        assert!(deck.is_empty());
        assert!(deck.deal().is_none());
    }

    #[test]
    fn deal_matches_peek() {
        let mut deck = ShuffledDeck::new(vec![1, 2, 3]);
        assert_eq!(deck.peek(), Some(&3));
        assert_eq!(deck.deal(), Some(3));
        assert_eq!(deck.len(), 2);
        assert_eq!(deck.peek(), Some(&2));
    }

    #[test]
    fn empty_deck_is_soft() {
        let mut deck: ShuffledDeck<u8> = ShuffledDeck::new(vec![]);
        assert!(deck.is_empty());
        assert_eq!(deck.deal(), None);
        assert_eq!(deck.peek(), None);
        deck.shuffle(&mut SeededRandom::new(3));
        assert!(deck.is_empty());
    }

    #[test]
    fn scripted_shuffle_is_fisher_yates() {
        // i = 2 swaps with 0, i = 1 swaps with 1
        let mut rng = ScriptedRandom::new().with_ints([0, 1]);
        let deck = ShuffledDeck::shuffled(vec!['a', 'b', 'c'], &mut rng);
        assert_eq!(deck.cards(), &['c', 'b', 'a']);
    }

    #[test]
    fn shuffle_reaches_every_position() {
        let mut rng = SeededRandom::new(11);
        let mut seen_top = [false; 4];
        for _ in 0..200 {
            let deck = ShuffledDeck::shuffled(vec![0usize, 1, 2, 3], &mut rng);
            seen_top[*deck.peek().unwrap()] = true;
        }
        assert!(seen_top.iter().all(|s| *s));
    }

    proptest! {
        #[test]
        fn shuffle_is_a_permutation(seed in any::<u64>(), len in 0usize..40) {
            let cards: Vec<usize> = (0..len).collect();
            let deck = ShuffledDeck::shuffled(cards.clone(), &mut SeededRandom::new(seed));
            let mut sorted = deck.cards().to_vec();
            sorted.sort_unstable();
            prop_assert_eq!(sorted, cards);
        }
    }
}
