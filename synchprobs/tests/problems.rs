use std::collections::BTreeMap;
use synchprobs::{
    run_stoplight, run_whalemating,
    stoplight::{Event, QUADRANTS, Route},
};

mod whalemating {
    use super::*;

    #[test]
    fn everybody_mates_once() {
        const NMATING: usize = 10;
        let matches = run_whalemating(NMATING).unwrap();
        assert_eq!(matches.len(), NMATING);

        let mut males = matches.iter().map(|m| m.male).collect::<Vec<_>>();
        let mut females = matches.iter().map(|m| m.female).collect::<Vec<_>>();
        let mut makers = matches.iter().map(|m| m.maker).collect::<Vec<_>>();
        males.sort();
        females.sort();
        makers.sort();
        let everyone = (0..NMATING).collect::<Vec<_>>();
        assert_eq!(males, everyone);
        assert_eq!(females, everyone);
        assert_eq!(makers, everyone);
    }

    #[test]
    fn many_rounds() {
        for _ in 0..20 {
            assert_eq!(run_whalemating(4).unwrap().len(), 4);
        }
    }
}

mod stoplight {
    use super::*;

    /// Replays `events`, checking that no quadrant is ever shared and that
    /// every car follows its route. Returns the number of cars seen.
    fn replay(events: &[Event]) -> usize {
        let mut occupant: [Option<u64>; QUADRANTS] = [None; QUADRANTS];
        let mut position: BTreeMap<u64, usize> = BTreeMap::new();
        let mut left = 0;

        for event in events {
            match *event {
                Event::Enter { car, quadrant } => {
                    assert_eq!(
                        occupant[quadrant], None,
                        "car {car} entered quadrant {quadrant} while it is taken"
                    );
                    if let Some(previous) = position.insert(car, quadrant) {
                        assert_eq!(occupant[previous], Some(car));
                        assert_eq!(quadrant, (previous + QUADRANTS - 1) % QUADRANTS);
                        occupant[previous] = None;
                    }
                    occupant[quadrant] = Some(car);
                }
                Event::Leave { car } => {
                    let last = position.remove(&car).expect("left without entering");
                    assert_eq!(occupant[last], Some(car));
                    occupant[last] = None;
                    left += 1;
                }
            }
        }
        assert!(position.is_empty());
        assert!(occupant.iter().all(Option::is_none));
        left
    }

    #[test]
    fn no_quadrant_is_shared() {
        let cars = (0..20)
            .map(|i| {
                let route = [Route::Straight, Route::Left, Route::Right][i % 3];
                (route, (i * 7 + i / 3) % QUADRANTS)
            })
            .collect::<Vec<_>>();
        let events = run_stoplight(&cars).unwrap();
        assert_eq!(replay(&events), cars.len());
        let expected = cars
            .iter()
            .map(|&(route, direction)| route.quadrants(direction).len() + 1)
            .sum::<usize>();
        assert_eq!(events.len(), expected);
    }

    #[test]
    fn all_left_turns() {
        // Four cars turning left from every direction wait for each other in
        // a cycle unless routes are reserved whole.
        for _ in 0..20 {
            let cars = (0..QUADRANTS).map(|d| (Route::Left, d)).collect::<Vec<_>>();
            let events = run_stoplight(&cars).unwrap();
            assert_eq!(replay(&events), QUADRANTS);
        }
    }
}
